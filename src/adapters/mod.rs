// Adapters layer: concrete implementations for external systems (http, browser, spreadsheets).

#[cfg(feature = "browser")]
pub mod browser;
pub mod http;
pub mod spreadsheet;
