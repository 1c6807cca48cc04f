// src/main.rs

use testharness::report::exit_code::{EXIT_CONFIG_ERROR, EXIT_HARNESS_ERROR};
use testharness::{cli, logging, run};

#[tokio::main]
async fn main() {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("testharness error: {err:?}");
        std::process::exit(EXIT_HARNESS_ERROR);
    }

    let code = match run(args).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("testharness error: {err}");
            if err.is_configuration() {
                EXIT_CONFIG_ERROR
            } else {
                EXIT_HARNESS_ERROR
            }
        }
    };
    std::process::exit(code);
}
