fn main() {
    if let Err(err) = csv_landing::run() {
        eprintln!("error: {err:#}");
        std::process::exit(csv_landing::exit_code(&err));
    }
}
