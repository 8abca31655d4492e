use std::path::Path;

use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::error::CmdError;
use fantoccini::wd::{Capabilities, WindowHandle};
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::selectors;
use crate::core::config::{BrowserConfig, TimingConfig};
use crate::core::sync::{Attachment, Portal, PortalCredentials, PortalError, PostDetail};

/// `Portal` implementation on top of a WebDriver (chromedriver) session.
///
/// Every interaction first waits for its element to be present instead of
/// sleeping a fixed amount; `ui_settle` only covers page animations.
pub struct CodmonPortal {
    client: Client,
    timing: TimingConfig,
}

fn browser_err(e: CmdError) -> PortalError {
    PortalError::Browser(e.to_string())
}

/// Whether the post list has rendered, given the outcome of waiting for it.
/// Running out of time means the page really has no posts.
fn listing_present(waited: Result<(), CmdError>) -> Result<bool, PortalError> {
    match waited {
        Ok(()) => Ok(true),
        Err(CmdError::WaitTimeout) => Ok(false),
        Err(e) => Err(browser_err(e)),
    }
}

/// Whether the first post seen before a page change has been replaced.
/// `now` is `None` once the old element is gone from the document.
fn listing_changed(before: &str, now: Option<&str>) -> bool {
    now.map_or(true, |text| text != before)
}

/// Chrome capabilities that make downloads land silently in `download_dir`.
pub fn chrome_capabilities(browser: &BrowserConfig, download_dir: &Path) -> Capabilities {
    let mut args = vec!["--no-sandbox", "--disable-dev-shm-usage"];
    if browser.headless {
        args.insert(0, "--headless=new");
    }

    let options = json!({
        "args": args,
        "prefs": {
            "download.default_directory": download_dir.to_string_lossy(),
            "download.prompt_for_download": false,
            "download.directory_upgrade": true,
            "plugins.always_open_pdf_externally": true,
        },
    });

    let mut caps = Capabilities::new();
    caps.insert("browserName".to_string(), json!("chrome"));
    caps.insert("goog:chromeOptions".to_string(), options);
    caps
}

impl CodmonPortal {
    /// Starts a browser session on the WebDriver server.
    pub async fn connect(
        browser: &BrowserConfig,
        timing: &TimingConfig,
        download_dir: &Path,
    ) -> Result<Self, PortalError> {
        let client = ClientBuilder::native()
            .capabilities(chrome_capabilities(browser, download_dir))
            .connect(&browser.webdriver_url)
            .await
            .map_err(|e| {
                PortalError::Browser(format!(
                    "could not start a session on {}: {}",
                    browser.webdriver_url, e
                ))
            })?;

        debug!(webdriver = %browser.webdriver_url, "Browser session started");
        Ok(Self {
            client,
            timing: timing.clone(),
        })
    }

    async fn wait_for(&self, selector: &str, what: &str) -> Result<Element, PortalError> {
        self.client
            .wait()
            .at_most(self.timing.element_wait)
            .for_element(Locator::Css(selector))
            .await
            .map_err(|e| PortalError::ElementMissing(format!("{} ({})", what, e)))
    }

    async fn click(&self, selector: &str, what: &str) -> Result<(), PortalError> {
        let element = self.wait_for(selector, what).await?;
        element.click().await.map_err(browser_err)
    }

    async fn type_into(&self, selector: &str, what: &str, text: &str) -> Result<(), PortalError> {
        let element = self.wait_for(selector, what).await?;
        element.send_keys(text).await.map_err(browser_err)
    }

    /// The `index`-th match of `selector`, looked up fresh.
    async fn nth(&self, selector: &str, index: usize, what: &str) -> Result<Element, PortalError> {
        let mut elements = self
            .client
            .find_all(Locator::Css(selector))
            .await
            .map_err(browser_err)?;

        if index >= elements.len() {
            return Err(PortalError::ElementMissing(format!(
                "{} #{} (only {} present)",
                what,
                index,
                elements.len()
            )));
        }
        Ok(elements.swap_remove(index))
    }

    async fn settle(&self) {
        if !self.timing.ui_settle.is_zero() {
            sleep(self.timing.ui_settle).await;
        }
    }

    async fn wait_for_window_count(&self, count: usize) -> Result<Vec<WindowHandle>, PortalError> {
        self.client
            .wait()
            .at_most(self.timing.element_wait)
            .on(move |client: &Client| {
                let client = client.clone();
                async move {
                    let handles = client.windows().await?;
                    Ok((handles.len() >= count).then_some(handles))
                }
            })
            .await
            .map_err(|e| match e {
                CmdError::WaitTimeout => {
                    PortalError::Timeout(format!("{} browser window(s)", count))
                }
                other => browser_err(other),
            })
    }

    /// Waits until `first` (the old page's first post) is stale or shows other text.
    async fn wait_for_new_listing(
        &self,
        first: Element,
        before: String,
    ) -> Result<(), PortalError> {
        self.client
            .wait()
            .at_most(self.timing.element_wait)
            .on(move |_: &Client| {
                let first = first.clone();
                let before = before.clone();
                async move {
                    let now = first.text().await.ok();
                    Ok(listing_changed(&before, now.as_deref()).then_some(()))
                }
            })
            .await
            .map_err(|e| match e {
                CmdError::WaitTimeout => PortalError::Timeout("the next page of posts".to_string()),
                other => browser_err(other),
            })
    }
}

#[async_trait]
impl Portal for CodmonPortal {
    async fn login(&self, credentials: &PortalCredentials) -> Result<(), PortalError> {
        self.client
            .goto(selectors::MENU_URL)
            .await
            .map_err(browser_err)?;

        self.click(selectors::LOGIN_LINK, "login link").await?;
        self.type_into(selectors::LOGIN_EMAIL, "email field", &credentials.email)
            .await?;
        self.type_into(
            selectors::LOGIN_PASSWORD,
            "password field",
            &credentials.password,
        )
        .await?;
        self.click(selectors::LOGIN_SUBMIT, "login button").await?;

        // The service tab only exists once we are logged in.
        self.wait_for(selectors::SERVICE_TAB, "service tab").await?;
        self.settle().await;
        Ok(())
    }

    async fn open_resource_room(&self) -> Result<(), PortalError> {
        self.click(selectors::SERVICE_TAB, "service tab").await?;
        self.settle().await;
        self.click(selectors::RESOURCE_ROOM, "resource room menu item")
            .await?;

        // Pagination renders even when the listing is empty.
        self.wait_for(selectors::NEXT_PAGE_BUTTON, "pagination").await?;
        self.settle().await;
        Ok(())
    }

    async fn post_count(&self) -> Result<usize, PortalError> {
        let waited = self
            .client
            .wait()
            .at_most(self.timing.element_wait)
            .for_element(Locator::Css(selectors::POST_ITEMS))
            .await
            .map(|_| ());
        if !listing_present(waited)? {
            debug!("No posts rendered within {:?}", self.timing.element_wait);
            return Ok(0);
        }

        let posts = self
            .client
            .find_all(Locator::Css(selectors::POST_ITEMS))
            .await
            .map_err(browser_err)?;
        Ok(posts.len())
    }

    async fn open_post(&self, index: usize) -> Result<PostDetail, PortalError> {
        let post = self.nth(selectors::POST_ITEMS, index, "post").await?;
        post.click().await.map_err(browser_err)?;

        let period = self
            .wait_for(selectors::PUBLISHED_PERIOD, "published period")
            .await?;
        let period_label = period.text().await.map_err(browser_err)?;

        let links = self
            .client
            .find_all(Locator::Css(selectors::ATTACHMENT_LINKS))
            .await
            .map_err(browser_err)?;

        let mut attachments = Vec::with_capacity(links.len());
        for (index, link) in links.iter().enumerate() {
            let file_name = link.text().await.map_err(browser_err)?.trim().to_string();
            if file_name.is_empty() {
                warn!(index, "Attachment link without a name, skipping");
                continue;
            }
            attachments.push(Attachment { index, file_name });
        }

        Ok(PostDetail {
            period_label,
            attachments,
        })
    }

    async fn download_attachment(&self, attachment: &Attachment) -> Result<(), PortalError> {
        let original = self.client.window().await.map_err(browser_err)?;
        let before = self.client.windows().await.map_err(browser_err)?.len();
        if before != 1 {
            warn!("{} windows open before download, expected 1", before);
        }

        let link = self
            .nth(selectors::ATTACHMENT_LINKS, attachment.index, "attachment link")
            .await?;
        link.click().await.map_err(browser_err)?;

        // The portal opens the file in a new tab, which is what triggers the download.
        let handles = self.wait_for_window_count(before + 1).await?;
        let popup = handles.into_iter().find(|handle| *handle != original);

        if let Some(popup) = popup {
            self.client
                .switch_to_window(popup)
                .await
                .map_err(browser_err)?;
            sleep(self.timing.popup_settle).await;
            self.client.close_window().await.map_err(browser_err)?;
            self.client
                .switch_to_window(original)
                .await
                .map_err(browser_err)?;
        }

        Ok(())
    }

    async fn back_to_posts(&self) -> Result<(), PortalError> {
        self.click(selectors::DETAIL_BACK_BUTTON, "back button")
            .await?;
        self.wait_for(selectors::NEXT_PAGE_BUTTON, "pagination").await?;
        self.settle().await;
        Ok(())
    }

    async fn next_page(&self) -> Result<bool, PortalError> {
        let button = self
            .wait_for(selectors::NEXT_PAGE_BUTTON, "next page button")
            .await?;

        let disabled = button.attr("disabled").await.map_err(browser_err)?;
        if disabled.is_some() {
            return Ok(false);
        }

        let first = self
            .client
            .find_all(Locator::Css(selectors::POST_ITEMS))
            .await
            .map_err(browser_err)?
            .into_iter()
            .next();
        let before = match &first {
            Some(post) => Some(post.text().await.map_err(browser_err)?),
            None => None,
        };

        button.click().await.map_err(browser_err)?;

        if let (Some(first), Some(before)) = (first, before) {
            self.wait_for_new_listing(first, before).await?;
        }
        self.settle().await;
        Ok(true)
    }

    async fn shutdown(&self) -> Result<(), PortalError> {
        self.client.clone().close().await.map_err(browser_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn browser(headless: bool) -> BrowserConfig {
        BrowserConfig {
            webdriver_url: "http://localhost:4444".to_string(),
            headless,
        }
    }

    #[test]
    fn test_capabilities_route_downloads() {
        let caps = chrome_capabilities(&browser(true), Path::new("/tmp/codmon_downloads"));
        let options = &caps["goog:chromeOptions"];

        assert_eq!(
            options["prefs"]["download.default_directory"],
            "/tmp/codmon_downloads"
        );
        assert_eq!(options["prefs"]["download.prompt_for_download"], false);
        assert_eq!(options["prefs"]["plugins.always_open_pdf_externally"], true);
        assert_eq!(options["args"][0], "--headless=new");
    }

    #[test]
    fn test_listing_present_after_wait() {
        assert!(listing_present(Ok(())).unwrap());
        assert!(!listing_present(Err(CmdError::WaitTimeout)).unwrap());
        assert!(matches!(
            listing_present(Err(CmdError::NotW3C(json!({"oops": true})))),
            Err(PortalError::Browser(_))
        ));
    }

    #[test]
    fn test_listing_changed_after_next_click() {
        // Same first post still attached: the old page is still showing.
        assert!(!listing_changed("2024年10月1日 お知らせ", Some("2024年10月1日 お知らせ")));
        assert!(listing_changed("2024年10月1日 お知らせ", Some("2024年9月1日 献立")));
        // Stale element.
        assert!(listing_changed("2024年10月1日 お知らせ", None));
    }

    #[test]
    fn test_capabilities_headed() {
        let caps = chrome_capabilities(&browser(false), Path::new("/dl"));
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();

        assert!(args.iter().all(|a| a != "--headless=new"));
        assert!(args.iter().any(|a| a == "--no-sandbox"));
    }
}
