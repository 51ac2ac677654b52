use rand::rngs::StdRng;
use rand::SeedableRng;

pub fn get_crypto_rng() -> StdRng {
    StdRng::from_entropy()
}
