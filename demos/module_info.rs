//! Query and print the connected module's identity.
//!
//! Usage: `cargo run --example module_info [serial port]`

use enocean_gateway::Gateway;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    println!("connecting to EnOcean module on {port}...");
    let gateway = Gateway::open(&port)?;

    let version = gateway.version_info().await?;
    println!("EURID:           {}", version.eurid);
    println!("app description: {}", version.app_description);
    println!("app version:     {}", version.app_version);
    println!("API version:     {}", version.api_version);
    println!("device version:  {}", version.device_version);

    println!("base ID:         {}", gateway.base_id().await?);
    if let Some(cycles) = gateway.base_id_remaining_write_cycles().await? {
        println!("remaining base ID write cycles: {cycles}");
    }

    gateway.shutdown();
    Ok(())
}
