//! Counter reading injection utility
//!
//! Publishes synthetic device payloads so a running bridge can be exercised
//! without the physical counter.
//!
//! ## Usage
//!
//! ```bash
//! # One production-data reading, timestamped now
//! inject-reading --topic-prefix plant/counter-01 --counter1 100 --counter2 1
//!
//! # A stream of readings one minute apart on the device clock
//! inject-reading --topic-prefix plant/counter-01 --counter1 100 --counter2 1 \
//!   --count 5 --increment 60 --clock-step-secs 60 --interval-ms 500
//!
//! # A status announcement
//! inject-reading --topic-prefix plant/counter-01 --status online \
//!   --name counter-01 --macid AA:BB:CC:DD:EE:FF --ipaddr 10.0.0.5
//! ```

use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use clap::Parser;
use counter_bridge::protocol::{parse_device_timestamp, DataPayload, DeviceStatusEvent};
use counter_bridge::transport::mqtt::parse_broker_url;
use rumqttc::{AsyncClient, MqttOptions, QoS, Transport};
use tokio::time::{sleep, Duration};
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "inject-reading",
    about = "Publish synthetic counter readings and status messages"
)]
struct Args {
    /// Topic prefix; payloads go to `{prefix}/data` or `{prefix}/status`
    #[arg(long, default_value = "plant/counter-01")]
    topic_prefix: String,

    /// Broker URL (mqtt:// or mqtts://)
    #[arg(long, env = "INJECT_BROKER_URL", default_value = "mqtt://localhost:1883")]
    broker_url: String,

    #[arg(long, env = "MQTT_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "MQTT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[arg(long, default_value_t = 0)]
    counter1: u64,
    #[arg(long, default_value_t = 0)]
    counter2: u64,
    #[arg(long, default_value_t = 0)]
    counter3: u64,
    #[arg(long, default_value_t = 0)]
    counter4: u64,

    /// Device timestamp of the first reading (default: now)
    #[arg(long)]
    timestamp: Option<String>,

    /// Number of readings to publish
    #[arg(long, default_value_t = 1)]
    count: u32,

    /// Added to counter1 for every subsequent reading
    #[arg(long, default_value_t = 0)]
    increment: u64,

    /// Device clock advance between readings
    #[arg(long, default_value_t = 60)]
    clock_step_secs: i64,

    /// Wall-clock pause between publishes
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Publish a status message with this status instead of readings
    #[arg(long)]
    status: Option<String>,

    #[arg(long, default_value = "counter")]
    name: String,

    #[arg(long, default_value = "00:00:00:00:00:00")]
    macid: String,

    #[arg(long, default_value = "0.0.0.0")]
    ipaddr: String,
}

struct ReadingInjector {
    client: AsyncClient,
}

impl ReadingInjector {
    async fn connect(args: &Args) -> Result<Self, Box<dyn std::error::Error>> {
        let address = parse_broker_url(&args.broker_url)?;
        let client_id = format!("inject-reading-{}", Uuid::new_v4().simple());

        let mut options = MqttOptions::new(client_id, address.host.clone(), address.port);
        options.set_keep_alive(Duration::from_secs(30));
        if address.tls {
            options.set_transport(Transport::tls_with_default_config());
        }
        if let Some(username) = &args.username {
            options.set_credentials(username, args.password.clone().unwrap_or_default());
        }

        let (client, mut eventloop) = AsyncClient::new(options, 10);

        tokio::spawn(async move {
            loop {
                if let Err(e) = eventloop.poll().await {
                    eprintln!("MQTT eventloop error: {e}");
                    break;
                }
            }
        });

        println!("Connecting to MQTT broker {}:{}...", address.host, address.port);
        sleep(Duration::from_millis(1000)).await;

        Ok(Self { client })
    }

    async fn publish(&self, topic: &str, payload: String) -> Result<(), Box<dyn std::error::Error>> {
        println!("📤 {topic}: {payload}");
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }

    async fn inject_readings(&self, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
        let topic = format!("{}/data", args.topic_prefix.trim_end_matches('/'));
        let start = first_timestamp(args.timestamp.as_deref())?;

        for index in 0..args.count {
            let reading = DataPayload {
                t: (start + ChronoDuration::seconds(args.clock_step_secs * i64::from(index)))
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
                di1: args.counter1 + args.increment * u64::from(index),
                di2: args.counter2,
                di3: args.counter3,
                di4: args.counter4,
            };
            self.publish(&topic, serde_json::to_string(&reading)?).await?;

            if index + 1 < args.count {
                sleep(Duration::from_millis(args.interval_ms)).await;
            }
        }
        Ok(())
    }

    async fn inject_status(&self, args: &Args, status: &str) -> Result<(), Box<dyn std::error::Error>> {
        let topic = format!("{}/status", args.topic_prefix.trim_end_matches('/'));
        let event = DeviceStatusEvent {
            status: status.to_string(),
            name: args.name.clone(),
            mac_address: args.macid.clone(),
            ip_address: args.ipaddr.clone(),
        };
        self.publish(&topic, serde_json::to_string(&event)?).await
    }
}

fn first_timestamp(raw: Option<&str>) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    match raw {
        Some(raw) => parse_device_timestamp(raw)
            .ok_or_else(|| format!("Invalid --timestamp: {raw}").into()),
        None => Ok(Utc::now()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let injector = ReadingInjector::connect(&args).await?;

    let result = match &args.status {
        Some(status) => injector.inject_status(&args, status).await,
        None => injector.inject_readings(&args).await,
    };

    if let Err(e) = result {
        eprintln!("✗ Failed to inject: {e}");
        std::process::exit(1);
    }

    // Allow the last publish to leave the socket
    sleep(Duration::from_millis(500)).await;
    println!("✓ Done");
    Ok(())
}
