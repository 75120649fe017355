use anyhow::Result;
use lockfetch::cli::LockfetchCli;

fn main() {
    match real_main() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("lockfetch error: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn real_main() -> Result<i32> {
    let cli = LockfetchCli::parse();
    cli.init_logging()?;
    cli.run()
}
