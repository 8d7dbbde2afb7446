mod connector;
mod dns_cache;
mod loader;
mod prober;
mod saver;
mod scanner;
mod worker;

pub use connector::HttpConnector;
pub use dns_cache::{DnsCache, SystemLookup};
pub use loader::load_paths;
pub use saver::{saver, write_report};
pub use scanner::Scanner;
