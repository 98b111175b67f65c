mod app;
mod config;
mod debug;
mod engine;
mod flow;
mod grid;
mod heat;
mod input;
mod particles;
mod quality;
mod render;
mod sprite;

fn main() {
    env_logger::init();
    log::info!("dotfield starting up");

    if let Err(e) = app::run() {
        log::error!("Fatal error: {e}");
        std::process::exit(1);
    }
}
