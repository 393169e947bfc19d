//! UniFFI binding generator for the Scrap mobile shells
//!
//! Run: cargo run --bin uniffi-bindgen -- generate --library <libscrap> --language swift --out-dir <dir>

fn main() {
    uniffi::uniffi_bindgen_main()
}
