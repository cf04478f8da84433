pub mod commerce;
pub mod hours;
pub mod product;
pub mod session;
pub mod tenant;
