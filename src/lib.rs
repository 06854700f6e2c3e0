pub mod arguments;
pub mod errors;
pub mod locator;
pub mod stamper;
pub mod version;
pub mod xml;
