// Codmon parent portal, driven through WebDriver.
// - `codmon_portal.rs` implements the `Portal` port on a fantoccini session.
// - `selectors.rs` holds the CSS selectors for the portal's pages.

pub mod codmon_portal;
pub mod selectors;

pub use codmon_portal::CodmonPortal;
