pub mod enums;
pub mod invoice;

pub use enums::*;
pub use invoice::*;
