fn main() {
    // Host builds and tests skip the ESP-IDF environment entirely
    let target = std::env::var("TARGET").unwrap_or_default();
    if target.ends_with("-espidf") {
        embuild::espidf::sysenv::output();
    }
}
