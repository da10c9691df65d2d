use anyhow::Result;
use async_trait::async_trait;
use rms::{allocate_array, allocate_scalar, Interface, Module, Network, NetworkConfig, Ports};
use tracing::info;

/// Moves a point around the unit circle, one step per cycle
struct Sensor;

#[async_trait]
impl Module for Sensor {
    async fn iterate(&mut self, ports: &Ports) -> anyhow::Result<()> {
        let angle = ports.cycle() as f64 * 0.1;
        ports.write_array("sensor.pose", &[angle.cos(), angle.sin(), angle])?;
        Ok(())
    }
}

/// Proportional controller pulling the pose back towards the origin
struct Controller;

#[async_trait]
impl Module for Controller {
    async fn setup(&mut self, ports: &Ports) -> anyhow::Result<()> {
        info!("Controller gain: {}", ports.read::<f64>("ctrl.gain")?);
        Ok(())
    }

    async fn iterate(&mut self, ports: &Ports) -> anyhow::Result<()> {
        let gain = ports.read::<f64>("ctrl.gain")?;
        let pose = ports.read_array::<f64>("sensor.pose")?;
        ports.write_array("ctrl.command", &[-gain * pose[0], -gain * pose[1]])?;
        Ok(())
    }
}

struct Logger;

#[async_trait]
impl Module for Logger {
    async fn iterate(&mut self, ports: &Ports) -> anyhow::Result<()> {
        if ports.cycle() % 20 == 0 {
            let command = ports.read_array::<f64>("ctrl.command")?;
            info!("cycle {}: command {:?}", ports.cycle(), command);
        }
        Ok(())
    }
}

fn build_interface() -> Result<Interface> {
    let sensor = Interface::new(vec![("pose", allocate_array(&[3], "float")?)]).wrap("sensor");
    let ctrl = Interface::new(vec![
        ("command", allocate_array(&[2], "float")?),
        // no module writes the gain, so reading it never blocks
        ("gain", allocate_scalar(0.5, "float")?),
    ])
    .wrap("ctrl");
    Ok(sensor + ctrl)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = NetworkConfig::from_yaml_file("network.yaml")?;
    let interface = build_interface()?;

    let mut network = Network::with_config(interface.clone(), config)?;
    network
        .add("sensor", Vec::<&str>::new(), vec!["sensor.pose"], Sensor)?
        .add("controller", vec!["sensor.pose", "ctrl.gain"], vec!["ctrl.command"], Controller)?
        .add("logger", vec!["ctrl.command"], Vec::<&str>::new(), Logger)?;

    let handle = network.start_threads()?;
    for result in handle.join().await {
        let summary = result?;
        println!("{} stopped after {} cycles ({:?})", summary.module, summary.cycles, summary.reason);
    }

    println!("{}", serde_json::to_string_pretty(&interface.snapshot())?);
    Ok(())
}
