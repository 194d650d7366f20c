fn main() {
    if let Err(err) = tse_ingest::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
