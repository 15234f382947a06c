use tracing::{info, warn, Level};
use webwx::{ClientConfig, Event, ProtocolClient};

fn load_config() -> Result<ClientConfig, Box<dyn std::error::Error>> {
    match std::env::var("WEBWX_CONFIG") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)?;
            info!("Loaded configuration from {}", path);
            Ok(serde_json::from_str(&raw)?)
        }
        Err(_) => Ok(ClientConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let config = load_config()?;
    let mut client = ProtocolClient::new(config)?;

    client.add_event_handler(Box::new(|event: &Event| {
        match event {
            Event::QrCode { url } => info!("Scan this QR code to log in: {}", url),
            Event::Scanned => info!("QR code scanned, confirm on your phone"),
            Event::LoggedIn { uin } => info!("Logged in as {}", uin),
            Event::Synced { payload } => {
                let count = payload
                    .get("AddMsgCount")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
                info!("Synced, {} new messages", count);
            }
            Event::SessionLost { reason } => warn!("Session lost: {}", reason),
            _ => {}
        }
        true
    }));

    loop {
        if let Err(e) = client.login().await {
            warn!("Login failed: {}", e);
            return Ok(());
        }

        match client.run_sync_loop().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!("Sync loop ended: {}, logging in again", e);
                client.logout();
            }
        }
    }
}
