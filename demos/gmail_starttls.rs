//! Gmail STARTTLS Example
//!
//! This example demonstrates how to:
//! - Use the Gmail settings preset (smtp.gmail.com:587, STARTTLS, LOGIN)
//! - Register a listener object instead of closures
//! - Watch the worker state while the outbox drains
//!
//! Gmail requires an app password. Set `GMAIL_USER`, `GMAIL_APP_PASSWORD`
//! and `MAIL_TO` before running.

use std::sync::Arc;
use std::time::Duration;

use smtp_outbox::{Client, DeliveryEvent, DeliveryListener, ErrorEvent, Settings, WorkerState};

struct ConsoleListener;

impl DeliveryListener for ConsoleListener {
    fn on_delivery(&self, event: &DeliveryEvent) {
        println!(
            "Delivered {} ({:?}) at {}",
            event.message.id(),
            event.message.subject(),
            event.delivered_at
        );
    }

    fn on_error(&self, event: &ErrorEvent) {
        match &event.message {
            Some(message) => eprintln!(
                "Failed {} (requeued: {}): {}",
                message.id(),
                event.requeued,
                event.error
            ),
            None => eprintln!("Session failed: {}", event.error),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let user = std::env::var("GMAIL_USER")?;
    let password = std::env::var("GMAIL_APP_PASSWORD")?;
    let to = std::env::var("MAIL_TO")?;

    let client = Client::new();
    client.setup(Settings::gmail(user.clone(), password))?;
    client.add_listener(Arc::new(ConsoleListener));

    for n in 1..=3 {
        client.send_text(&to, &user, &format!("Outbox test {}", n), "Sent over STARTTLS.")?;
    }

    // The worker pauses between messages, so this takes a little while.
    for _ in 0..600 {
        if client.outbox_size() == 0 && client.worker_state() == WorkerState::Waiting {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    println!("{:?}", client.metrics());
    Ok(())
}
