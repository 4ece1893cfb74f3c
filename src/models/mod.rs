pub mod court;
pub mod enums;
pub mod equipment;
pub mod file;
pub mod history;
pub mod ledger;
pub mod routing;

pub use court::*;
pub use enums::*;
pub use equipment::*;
pub use file::*;
pub use history::*;
pub use ledger::*;
pub use routing::*;
