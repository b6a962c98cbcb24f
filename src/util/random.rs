use rand::{Rng, RngCore};


pub trait Random {
    fn next_u16() -> u16;
    fn next_u64() -> u64;
}
pub struct RngRandom {}
impl Random for RngRandom {
    fn next_u16() -> u16 {
        rand::thread_rng().gen()
    }

    fn next_u64() -> u64 {
        rand::thread_rng().next_u64()
    }
}
