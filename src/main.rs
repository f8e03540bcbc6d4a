fn main() {
    if let Err(err) = orbit_showcase::run() {
        eprintln!("Application error: {err}");
        std::process::exit(1);
    }
}
