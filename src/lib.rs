pub mod util;

pub use crate::util::bag::{Bag, BagError};
