pub mod chromium_host;
pub mod connection;

pub use chromium_host::ChromiumHost;
pub use connection::connect_to_browser_and_page;
