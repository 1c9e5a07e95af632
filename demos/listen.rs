//! Print every telegram heard on the air.
//!
//! Usage: `cargo run --example listen [serial port]`

use enocean_gateway::Gateway;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    let gateway = Gateway::open(&port)?;

    gateway.on_erp1_received(None, |telegram| {
        println!(
            "{} {:?} data {:02X?} rssi {:?}",
            telegram.sender, telegram.rorg, telegram.telegram_data, telegram.rssi
        );
    });
    gateway.on_new_device(|address| println!("new device on the air: {address}"));
    gateway.on_parsing_failed(|message| eprintln!("parse failed: {message}"));

    println!("listening on {port}, press Ctrl-C to exit");
    std::future::pending::<()>().await;
    Ok(())
}
