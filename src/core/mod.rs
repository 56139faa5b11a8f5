pub mod cache;
pub mod competitors;
pub mod cursor;
pub mod ideas;
pub mod keywords;
pub mod niche;
pub mod services;
pub mod storage;
pub mod youtube;

pub use cache::*;
pub use competitors::*;
pub use cursor::*;
pub use ideas::*;
pub use keywords::*;
pub use niche::*;
pub use services::*;
pub use storage::*;
pub use youtube::*;
