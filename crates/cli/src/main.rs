use std::process::ExitCode;

fn main() -> ExitCode {
    skucast_cli::run()
}
