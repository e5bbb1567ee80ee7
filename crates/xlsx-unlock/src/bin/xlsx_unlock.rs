use xlsx_unlock::UnlockError;

fn main() {
    if let Err(err) = xlsx_unlock::cli::run() {
        eprintln!("error: {err:#}");
        let code = err
            .downcast_ref::<UnlockError>()
            .map_or(1, UnlockError::exit_code);
        std::process::exit(code);
    }
}
