use crate::protocol::NewCar;
use rand::Rng;

/// Brands used when generating random cars
pub const CAR_BRANDS: &[&str] = &[
    "Tesla",
    "BMW",
    "Mercedes",
    "Audi",
    "Porsche",
    "Ferrari",
    "Lamborghini",
    "McLaren",
    "Bugatti",
    "Koenigsegg",
];

pub const CAR_MODELS: &[&str] = &[
    "Model S",
    "M5",
    "AMG GT",
    "RS7",
    "911",
    "SF90",
    "Aventador",
    "P1",
    "Chiron",
    "Jesko",
];

/// "Brand Model" drawn independently from both lists
pub fn random_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let brand = CAR_BRANDS[rng.gen_range(0..CAR_BRANDS.len())];
    let model = CAR_MODELS[rng.gen_range(0..CAR_MODELS.len())];
    format!("{} {}", brand, model)
}

/// Lowercase `#rrggbb`
pub fn random_color<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("#{:06x}", rng.gen_range(0..0xff_ffffu32))
}

pub fn random_car<R: Rng + ?Sized>(rng: &mut R) -> NewCar {
    NewCar {
        name: random_name(rng),
        color: random_color(rng),
    }
}

/// Colour inputs only accept `#` followed by six hex digits.
pub fn is_hex_color(s: &str) -> bool {
    s.len() == 7 && s.starts_with('#') && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}

pub fn hex_to_rgb(s: &str) -> Option<(u8, u8, u8)> {
    if !is_hex_color(s) {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&s[i..i + 2], 16).ok();
    Some((channel(1)?, channel(3)?, channel(5)?))
}
