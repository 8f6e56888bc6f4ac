use anyhow::{anyhow, bail, Context, Result};
use face_detect::DetectorConfig;

const USAGE: &str = "Usage: crowdwatch [--source <uri>] [--width <px>] [--height <px>] \
[--cascade <path>] [--threshold <n>] [--scale-factor <f>] [--min-neighbors <n>] \
[--min-size <WxH>] [--jpeg-quality <1-100>] [--bind <addr:port>] [--auth-token <token>]";

/// Runtime configuration assembled from command-line flags.
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    pub source_uri: String,
    pub width: i32,
    pub height: i32,
    pub cascade_path: String,
    pub alarm_threshold: usize,
    pub detector: DetectorConfig,
    pub jpeg_quality: u8,
    pub bind_addr: String,
    pub auth_token: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            source_uri: "0".to_string(),
            width: 640,
            height: 480,
            cascade_path: "haarcascade_frontalface_default.xml".to_string(),
            alarm_threshold: 2,
            detector: DetectorConfig::default(),
            jpeg_quality: 85,
            bind_addr: "0.0.0.0:5000".to_string(),
            auth_token: None,
        }
    }
}

impl MonitorConfig {
    /// Parse `args` as produced by `std::env::args` (program name first).
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut config = Self::default();

        let mut idx = 1;
        while idx < args.len() {
            let flag = args[idx].as_str();
            match flag {
                "--source" => config.source_uri = value_of(args, &mut idx, flag)?,
                "--cascade" => config.cascade_path = value_of(args, &mut idx, flag)?,
                "--bind" => config.bind_addr = value_of(args, &mut idx, flag)?,
                "--auth-token" => config.auth_token = Some(value_of(args, &mut idx, flag)?),
                "--width" => {
                    config.width = parse_value(args, &mut idx, flag, "a positive integer")?;
                    if config.width <= 0 {
                        bail!("--width must be a positive integer");
                    }
                }
                "--height" => {
                    config.height = parse_value(args, &mut idx, flag, "a positive integer")?;
                    if config.height <= 0 {
                        bail!("--height must be a positive integer");
                    }
                }
                "--threshold" => {
                    config.alarm_threshold =
                        parse_value(args, &mut idx, flag, "a non-negative integer")?;
                }
                "--scale-factor" => {
                    let value: f64 = parse_value(args, &mut idx, flag, "a number > 1.0")?;
                    if value <= 1.0 {
                        bail!("--scale-factor must be greater than 1.0");
                    }
                    config.detector.scale_factor = value;
                }
                "--min-neighbors" => {
                    let value: i32 = parse_value(args, &mut idx, flag, "an integer >= 1")?;
                    if value < 1 {
                        bail!("--min-neighbors must be at least 1");
                    }
                    config.detector.min_neighbors = value;
                }
                "--min-size" => {
                    let value = value_of(args, &mut idx, flag)?;
                    config.detector.min_size = parse_size(&value)
                        .with_context(|| format!("--min-size must look like 30x30, got {value:?}"))?;
                }
                "--jpeg-quality" => {
                    let value: u8 =
                        parse_value(args, &mut idx, flag, "an integer between 1 and 100")?;
                    if !(1..=100).contains(&value) {
                        bail!("--jpeg-quality must be an integer between 1 and 100");
                    }
                    config.jpeg_quality = value;
                }
                "--help" | "-h" => bail!(USAGE),
                other => bail!("Unrecognised flag: {other}\n{USAGE}"),
            }
            idx += 1;
        }

        Ok(config)
    }
}

fn value_of(args: &[String], idx: &mut usize, flag: &str) -> Result<String> {
    *idx += 1;
    args.get(*idx)
        .cloned()
        .ok_or_else(|| anyhow!("{flag} requires a value"))
}

fn parse_value<T: std::str::FromStr>(
    args: &[String],
    idx: &mut usize,
    flag: &str,
    expected: &str,
) -> Result<T> {
    let raw = value_of(args, idx, flag)?;
    raw.parse::<T>()
        .map_err(|_| anyhow!("{flag} must be {expected}, got {raw:?}"))
}

fn parse_size(value: &str) -> Result<(i32, i32)> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow!("missing 'x' separator"))?;
    let w: i32 = w.trim().parse().context("width is not an integer")?;
    let h: i32 = h.trim().parse().context("height is not an integer")?;
    if w <= 0 || h <= 0 {
        bail!("dimensions must be positive");
    }
    Ok((w, h))
}
