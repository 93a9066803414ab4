use dotenvy::dotenv;
use errand_dispatcher::{cli::handle_command_line_args, config::DispatcherConfig, dispatcher::run_dispatcher};
use log::info;

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    if handle_command_line_args() {
        return;
    }
    let config = DispatcherConfig::from_env_or_default();

    info!("🚀️ Starting dispatcher against {}", config.database_url);
    match run_dispatcher(config).await {
        Ok(_) => println!("Bye!"),
        Err(e) => eprintln!("{e}"),
    }
}
