use std::{path::PathBuf, sync::Arc, thread, time::Duration};

use clap::Parser;
use log::{error, info, warn};
use webwx_rust::protocol::QrTicket;
use webwx_rust::types::{MessageKind, SyncUpdate};
use webwx_rust::{
    Client, Error, HttpTransport, Presence, SessionHandler, Transport, WebwxConfig,
};

/// Log in by QR code and serve one session until it ends.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// JSON configuration file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the directory the QR code image is written to.
    #[arg(long)]
    qrcode_dir: Option<PathBuf>,

    /// Override the user agent advertised by the client.
    #[arg(long)]
    user_agent: Option<String>,

    /// Display name of a friend or group to message once logged in.
    #[arg(long)]
    send_to: Option<String>,

    /// Text to send to `--send-to`.
    #[arg(long, requires = "send_to")]
    text: Option<String>,

    /// Image file to send to `--send-to`.
    #[arg(long, requires = "send_to")]
    image: Option<PathBuf>,
}

/// Prints the QR code and logs inbound traffic.
struct ConsoleHandler;

impl SessionHandler for ConsoleHandler {
    fn on_qr_code(&self, ticket: &QrTicket) {
        match ticket.render_ascii() {
            Ok(art) => println!("{art}"),
            Err(e) => warn!("cannot render qrcode: {}", e),
        }
        println!("QR code saved to {}", ticket.path.display());
    }

    fn on_login(&self, uuid: &str) {
        info!("logged in, uuid {}", uuid);
    }

    fn on_logout(&self, uuid: &str) {
        info!("logged out, uuid {}", uuid);
    }

    fn on_message(&self, update: &SyncUpdate) {
        for message in &update.messages {
            match message.kind {
                MessageKind::Text => info!(
                    "[{}] {}: {}",
                    message.from_user_name,
                    message.group_sender.as_deref().unwrap_or("-"),
                    message.content
                ),
                kind => info!(
                    "[{}] {:?} message {}",
                    message.from_user_name, kind, message.msg_id
                ),
            }
        }
    }
}

/// Wait until the session is online, or give up once the engine finished.
fn wait_online<T: Transport>(client: &Client<T>) -> bool {
    loop {
        let status = client.status();
        if status.presence == Presence::Online {
            return true;
        }
        if status.finished || status.presence == Presence::LoggedOut {
            return false;
        }
        thread::sleep(Duration::from_millis(500));
    }
}

fn send_outbox<T: Transport>(
    client: &Client<T>,
    to: &str,
    text: Option<&str>,
    image: Option<&PathBuf>,
) {
    if !wait_online(client) {
        warn!("session ended before {} could be messaged", to);
        return;
    }
    if let Some(text) = text {
        match client.send_text_by_name(to, text) {
            Ok(receipt) => info!("sent text to {}, msg id {}", to, receipt.msg_id),
            Err(e) => error!("send text to {} failed: {}", to, e),
        }
    }
    if let Some(path) = image {
        let outcome = client
            .friend_by_name(to)
            .map(|friend| friend.user_name)
            .or_else(|| client.group_by_name(to).map(|group| group.user_name))
            .ok_or_else(|| Error::UnknownContact(to.to_string()))
            .and_then(|user_name| client.send_image_file(&user_name, path));
        match outcome {
            Ok(receipt) => info!("sent image to {}, msg id {}", to, receipt.msg_id),
            Err(e) => error!("send image to {} failed: {}", to, e),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => WebwxConfig::load(path)?,
        None => WebwxConfig::default(),
    };
    if let Some(dir) = cli.qrcode_dir {
        config = config.with_qrcode_dir(dir);
    }
    if let Some(agent) = cli.user_agent {
        config = config.with_user_agent(agent);
    }

    let transport = HttpTransport::new(&config);
    let client = Arc::new(Client::new(config, transport, Arc::new(ConsoleHandler)));
    let engine = client.spawn();

    let outbox = cli.send_to.map(|to| {
        let client = Arc::clone(&client);
        let (text, image) = (cli.text, cli.image);
        thread::spawn(move || send_outbox(&*client, &to, text.as_deref(), image.as_ref()))
    });

    let result = engine.join().map_err(|_| "engine thread panicked")?;
    if let Some(outbox) = outbox {
        if outbox.join().is_err() {
            error!("send worker panicked");
        }
    }
    match result {
        Ok(()) | Err(Error::SessionEnded { .. }) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
