// CwPaddleKeyer - Build Script

fn main() {
    // ESP-IDF environment setup; host builds (tests, demo binary) skip it.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }
}
