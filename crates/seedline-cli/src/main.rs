//! `seedline` binary entrypoint.

#[tokio::main]
async fn main() {
    let exit_code = seedline_cli::run().await;
    std::process::exit(exit_code);
}
