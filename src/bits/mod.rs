pub mod cursor;
pub mod reader;

pub use cursor::ByteCursor;
pub use reader::{mask, BitReader};
