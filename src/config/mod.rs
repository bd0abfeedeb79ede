pub mod types;
pub mod loader;
pub mod validator;
pub mod reflect;
pub mod options;

pub use types::*;
pub use loader::*;
pub use validator::*;
pub use reflect::*;
pub use options::*;
