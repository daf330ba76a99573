use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};

fn main() {
    let key: [u8; 32] = rand::random();
    let encoded_key = STANDARD_NO_PAD.encode(key);
    println!("HS256 JWT signing secret (Base-64 encoded): {encoded_key}");
}
