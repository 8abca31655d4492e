// CSS selectors for the Codmon parent portal (onsen UI).
//
// These track the live site's markup and break whenever it changes.

pub const MENU_URL: &str = "https://parents.codmon.com/menu";

pub const LOGIN_LINK: &str = concat!(
    "body > div > div:nth-child(1) > ons-page > ons-page > div.page__content > ",
    "ons-navigator > ons-page > div.page__content > section > div.menu__loginLink"
);

pub const LOGIN_EMAIL: &str = concat!(
    "body > div > div:nth-child(1) > ons-page > ons-page > div.page__content > ",
    "ons-navigator > ons-page > div.page__content > div.loginPage--parent > section > input"
);

pub const LOGIN_PASSWORD: &str = concat!(
    "body > div > div:nth-child(1) > ons-page > ons-page > div.page__content > ",
    "ons-navigator > ons-page > div.page__content > div.loginPage--parent > section > ",
    "div:nth-child(4) > input"
);

pub const LOGIN_SUBMIT: &str = concat!(
    "body > div > div:nth-child(1) > ons-page > ons-page > div.page__content > ",
    "ons-navigator > ons-page > div.page__content > div.loginPage--parent > section > ",
    "ons-button"
);

/// Footer tab that opens the "service" page.
pub const SERVICE_TAB: &str = concat!(
    "body > div > div:nth-child(1) > ons-page > div:nth-child(3) > ons-tabbar > ",
    "div.tabbar.ons-tabbar__footer.ons-swiper-tabbar > ",
    "ons-tab.serviceInActiveIcon.tabIcon.tabbar__item > button"
);

/// First entry of the service menu: the resource room.
pub const RESOURCE_ROOM: &str = concat!(
    "#service_page > div.page__content > ons-navigator > ons-page > div.page__content > ",
    "div > div > section > ul > li:nth-child(1)"
);

pub const POST_ITEMS: &str = concat!(
    "#service_page > div.page__content > ons-navigator > ons-page:nth-child(2) > ",
    "div.page__content > div > div:nth-child(3) > ul > li > div"
);

pub const NEXT_PAGE_BUTTON: &str = concat!(
    "#service_page > div.page__content > ons-navigator > ons-page:nth-child(2) > ",
    "div.page__content > div > div:nth-child(3) > div.basicPagination > ul > ",
    "li:nth-child(2) > div > button"
);

pub const PUBLISHED_PERIOD: &str = concat!(
    "#service_page > div.page__content > ons-navigator > ",
    "ons-page.handoutDetailPage.selectable-container.page > div.page__content > div > ",
    "div.handoutDetailContainer > div.handoutDetailFooter > div.handoutPublishedPeriod"
);

pub const ATTACHMENT_LINKS: &str = concat!(
    "#service_page > div.page__content > ons-navigator > ",
    "ons-page.handoutDetailPage.selectable-container.page > div.page__content > div > ",
    "div.attachmentContainer > div:nth-child(2) > ul > li > span.attachment_link"
);

pub const DETAIL_BACK_BUTTON: &str = concat!(
    "#service_page > div.page__content > ons-navigator > ",
    "ons-page.handoutDetailPage.selectable-container.page > ons-toolbar > ",
    "div.left.toolbar__left > ons-back-button > span.back-button__label"
);
