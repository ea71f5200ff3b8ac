use anyhow::Result;
use tokio::sync::mpsc;

use spsmarket::config::Config;
use spsmarket::engine::Engine;
use spsmarket::logging::{json_log, obj, v_num, v_str};
use spsmarket::{runtime, server};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    json_log(
        "system",
        obj(&[
            ("event", v_str("starting")),
            ("addr", v_str(&cfg.listen_addr)),
            ("tick_ms", v_num(cfg.tick_ms as f64)),
            ("validation_delay_ms", v_num(cfg.validation_delay_ms as f64)),
        ]),
    );

    let (input_tx, input_rx) = mpsc::unbounded_channel();
    let clients = runtime::new_client_map();

    let engine = Engine::new(cfg.clone());
    tokio::spawn(runtime::run_engine(
        engine,
        input_rx,
        clients.clone(),
        cfg.tick_ms,
    ));

    server::run(&cfg.listen_addr, input_tx, clients).await
}
