//! Device information example for TR-064.
//!
//! Connects to a router, loads its service directory, lists the services and
//! calls `DeviceInfo:1#GetInfo`.
//!
//! Required features: `transport-tcp` (add `transport-tls` for HTTPS)
//!
//! # Usage
//!
//! ```bash
//! TR064_HOST=192.168.178.1 TR064_USER=admin TR064_PASSWORD=secret \
//!     cargo run --example device_info
//! ```
//!
//! Set `TR064_HTTPS=1` to connect with TLS on port 49443 without certificate
//! verification.

#[cfg(feature = "transport-tcp")]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::env;

    use tr064::{ActionRequest, ConnectionSettings, Output, Tr064Client};

    println!("=== TR-064 Device Info Example ===\n");

    let host = env::var("TR064_HOST").unwrap_or_else(|_| String::from("192.168.178.1"));
    let user = env::var("TR064_USER").unwrap_or_default();
    let password = env::var("TR064_PASSWORD").unwrap_or_default();
    let settings = if env::var("TR064_HTTPS").is_ok_and(|value| value == "1") {
        ConnectionSettings::https_insecure(host, user, password)
    } else {
        ConnectionSettings::http(host, user, password)
    };

    println!("1. Connecting to {}:{} ({:?})...", settings.host, settings.port, settings.scheme);
    let mut client = match Tr064Client::connect(settings) {
        Ok(client) => client,
        Err(e) => {
            println!("   ✗ Connection failed: {}", e);
            println!("   Set TR064_HOST to the address of your router.");
            return Ok(());
        }
    };
    println!("   ✓ Connected");

    println!("\n2. Loading service directory...");
    match client.init() {
        Ok(count) => println!("   ✓ {} services", count),
        Err(e) => {
            println!("   ✗ Discovery failed: {}", e);
            return Ok(());
        }
    }
    for (service, url) in client.directory() {
        println!("   {:<60} {}", service, url);
    }

    println!("\n3. Calling DeviceInfo:1#GetInfo...");
    let mut outputs = [
        Output::new("NewManufacturerName"),
        Output::new("NewModelName"),
        Output::new("NewSerialNumber"),
        Output::new("NewSoftwareVersion"),
        Output::new("NewUpTime"),
    ];
    match client.action(&ActionRequest::new("DeviceInfo:1", "GetInfo"), &mut outputs) {
        Ok(response) => {
            println!("   ✓ HTTP {} after {} attempt(s)", response.status, response.attempts);
            for output in &outputs {
                println!("   {:<22} {}", output.name(), output.value().unwrap_or("-"));
            }
        }
        Err(e) => println!("   ✗ Action failed: {}", e),
    }

    println!("\n=== Example complete ===");
    Ok(())
}

#[cfg(not(feature = "transport-tcp"))]
fn main() {
    eprintln!("This example requires the 'transport-tcp' feature.");
    eprintln!("Run with: cargo run --example device_info --features transport-tcp");
    std::process::exit(1);
}
