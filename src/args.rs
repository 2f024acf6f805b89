//! Commandline argument parser using clap for emgwire

use crate::config::CaptureConfig;
use crate::protocol::DataType;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Capture EMG samples from a Bluetooth-serial device into CSV files
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct EmgArgs {
    #[command(subcommand)]
    /// What to do: capture from a device, run the simulator, or list ports
    pub command: CommandTask,

    /// RON file with capture settings
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Directory CSV exports are written to
    #[arg(short = 'd', long = "dir")]
    pub output_dir: Option<PathBuf>,
}

/// The task to run
#[derive(Debug, Subcommand, Clone)]
pub enum CommandTask {
    /// Stream samples from a device into a CSV file
    #[command(about)]
    Capture(CaptureCommand),

    /// Decode the software simulation device and write a batch CSV
    #[command(about)]
    Simulate(SimulateCommand),

    /// List available serial ports
    #[command(about)]
    Ports,
}

/// Stream samples from a device into a CSV file
#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct CaptureCommand {
    /// Serial port of the device. Without it a device selector is shown
    #[arg(short = 'p', long = "port")]
    pub port: Option<PathBuf>,

    /// Filename for the CSV output
    #[arg(short = 'o', long = "out", default_value = "capture.csv")]
    pub outfile: String,

    /// Which samples the device should send
    #[arg(short = 't', long = "data-type", value_enum)]
    pub data_type: Option<DataType>,

    /// Serial port speed
    #[arg(short = 'b', long = "baud")]
    pub baud_rate: Option<u32>,
}

/// Decode the software simulation device and write a batch CSV
#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct SimulateCommand {
    /// Number of sample packets to record
    #[arg(short = 'n', long = "packets", default_value_t = 30)]
    pub packets: usize,

    /// Filename for the CSV output
    #[arg(short = 'o', long = "out", default_value = "simulated.csv")]
    pub outfile: String,

    /// Pace packets in real time instead of as fast as possible
    #[arg(short = 'r', long = "realtime")]
    pub realtime: bool,
}

impl EmgArgs {
    /// Layer the command line over `config`.
    pub fn apply(&self, config: &mut CaptureConfig) {
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let CommandTask::Capture(cmd) = &self.command {
            if let Some(data_type) = cmd.data_type {
                config.data_type = data_type;
            }
            if let Some(baud_rate) = cmd.baud_rate {
                config.baud_rate = baud_rate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_with_overrides() {
        let args = EmgArgs::try_parse_from([
            "emgwire", "-d", "out", "capture", "--port", "/dev/rfcomm0", "-t", "rms", "-b",
            "9600",
        ])
        .unwrap();

        let mut config = CaptureConfig::default();
        args.apply(&mut config);
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.data_type, DataType::Rms);
        assert_eq!(config.baud_rate, 9600);

        match args.command {
            CommandTask::Capture(cmd) => {
                assert_eq!(cmd.port, Some(PathBuf::from("/dev/rfcomm0")));
                assert_eq!(cmd.outfile, "capture.csv");
            }
            other => panic!("parsed {:?}", other),
        }
    }

    #[test]
    fn simulate_defaults() {
        let args = EmgArgs::try_parse_from(["emgwire", "simulate"]).unwrap();
        match args.command {
            CommandTask::Simulate(cmd) => {
                assert_eq!(cmd.packets, 30);
                assert_eq!(cmd.outfile, "simulated.csv");
                assert!(!cmd.realtime);
            }
            other => panic!("parsed {:?}", other),
        }
    }

    #[test]
    fn simulate_leaves_config_alone() {
        let args = EmgArgs::try_parse_from(["emgwire", "simulate", "-n", "5"]).unwrap();
        let mut config = CaptureConfig::default();
        args.apply(&mut config);
        assert_eq!(config, CaptureConfig::default());
    }
}
