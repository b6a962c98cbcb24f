pub mod markup;
pub mod normalize;
pub mod observers;
pub mod random;
