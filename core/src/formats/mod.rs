pub mod catalog;
pub mod circ;
pub mod record;
pub mod select;
pub mod slice;
pub mod utils;
