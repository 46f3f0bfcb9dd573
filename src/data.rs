use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Historical cap on the number of orders taken from the input file.
/// Overridable with `--max-orders`.
pub const DEFAULT_MAX_ORDERS: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Temp {
    Hot,
    Cold,
    Frozen,
}

impl Temp {
    /// The shelf an order of this temperature decays at 1x on.
    pub fn shelf(self) -> Shelf {
        match self {
            Temp::Hot => Shelf::Hot,
            Temp::Cold => Shelf::Cold,
            Temp::Frozen => Shelf::Frozen,
        }
    }
}

impl fmt::Display for Temp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.shelf(), f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shelf {
    Hot,
    Cold,
    Frozen,
    Overflow,
    Waste,
}

/// Storage shelves in snapshot order. Waste is virtual and listed last.
pub const ALL_SHELVES: [Shelf; 5] = [
    Shelf::Hot,
    Shelf::Cold,
    Shelf::Frozen,
    Shelf::Overflow,
    Shelf::Waste,
];

impl fmt::Display for Shelf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Shelf::Hot => "hot",
            Shelf::Cold => "cold",
            Shelf::Frozen => "frozen",
            Shelf::Overflow => "overflow",
            Shelf::Waste => "waste",
        };
        f.pad(name)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Order {
    pub id: String,
    pub name: String,
    pub temp: Temp,
    pub shelf_life: u32, // in seconds
    pub decay_rate: f64, // per-second multiplier
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Capacity {
    pub hot: usize,
    pub cold: usize,
    pub frozen: usize,
    pub overflow: usize,
}

impl Capacity {
    /// Capacity of a shelf; waste is unbounded.
    pub fn of(&self, shelf: Shelf) -> usize {
        match shelf {
            Shelf::Hot => self.hot,
            Shelf::Cold => self.cold,
            Shelf::Frozen => self.frozen,
            Shelf::Overflow => self.overflow,
            Shelf::Waste => usize::MAX,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub capacity: Capacity,
    pub intake_orders_per_sec: u32,
    pub pickup_min_sec: u64,
    pub pickup_max_sec: u64,
    pub cleanup_delay: f64, // in seconds
}

impl Config {
    fn validate(&self) -> Result<()> {
        if self.intake_orders_per_sec == 0 {
            bail!("intake_orders_per_sec must be positive");
        }
        if self.pickup_min_sec == 0 {
            bail!("pickup_min_sec must be positive");
        }
        if self.pickup_min_sec > self.pickup_max_sec {
            bail!(
                "pickup_min_sec ({}) exceeds pickup_max_sec ({})",
                self.pickup_min_sec,
                self.pickup_max_sec
            );
        }
        if self.cleanup_delay <= 0.0 {
            bail!("cleanup_delay must be positive");
        }
        Ok(())
    }
}

fn parse_orders(text: &str) -> Result<Vec<Order>> {
    let orders: Vec<Order> = serde_json::from_str(text)?;

    for order in &orders {
        if order.shelf_life == 0 {
            bail!("order '{}': shelfLife must be positive", order.id);
        }
        if order.decay_rate < 0.0 {
            bail!("order '{}': decayRate must not be negative", order.id);
        }
    }

    Ok(orders)
}

fn parse_config(text: &str) -> Result<Config> {
    let config: Config = serde_json::from_str(text)?;
    config.validate()?;
    Ok(config)
}

pub fn load_orders(path: &Path, max_orders: usize) -> Result<Vec<Order>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read orders file '{}'", path.display()))?;

    let mut orders = parse_orders(&text)
        .with_context(|| format!("invalid orders file '{}'", path.display()))?;

    orders.truncate(max_orders);
    Ok(orders)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config file '{}'", path.display()))?;

    parse_config(&text).with_context(|| format!("invalid config file '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONFIG_JSON: &str = r#"{
        "capacity": {"hot": 10, "cold": 10, "frozen": 10, "overflow": 15},
        "intake_orders_per_sec": 2,
        "pickup_min_sec": 2,
        "pickup_max_sec": 6,
        "cleanup_delay": 1.0
    }"#;

    const ORDERS_JSON: &str = r#"[
        {"id": "a8cfcb76", "name": "Banana Split", "temp": "frozen", "shelfLife": 20, "decayRate": 0.63},
        {"id": "58e9b5fe", "name": "McFlury", "temp": "frozen", "shelfLife": 375, "decayRate": 0.4},
        {"id": "2ec069e3", "name": "Acai Bowl", "temp": "cold", "shelfLife": 249, "decayRate": 0.19}
    ]"#;

    #[test]
    fn parse_config_ok() {
        let config = parse_config(CONFIG_JSON).unwrap();

        assert_eq!(config.capacity.of(Shelf::Hot), 10);
        assert_eq!(config.capacity.of(Shelf::Overflow), 15);
        assert_eq!(config.capacity.of(Shelf::Waste), usize::MAX);
        assert_eq!(config.intake_orders_per_sec, 2);
        assert_eq!(config.pickup_min_sec, 2);
        assert_eq!(config.pickup_max_sec, 6);
        assert_eq!(config.cleanup_delay, 1.0);
    }

    #[test]
    fn parse_config_rejects_unknown_key() {
        let text = CONFIG_JSON.replacen("\"cleanup_delay\"", "\"cleanup_dealy\"", 1);
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn parse_config_rejects_missing_key() {
        let text = r#"{
            "capacity": {"hot": 10, "cold": 10, "frozen": 10, "overflow": 15},
            "intake_orders_per_sec": 2,
            "pickup_min_sec": 2,
            "pickup_max_sec": 6
        }"#;
        assert!(parse_config(text).is_err());
    }

    #[test]
    fn parse_config_rejects_unknown_shelf() {
        let text = CONFIG_JSON.replacen("\"hot\"", "\"lukewarm\"", 1);
        assert!(parse_config(&text).is_err());
    }

    #[test]
    fn parse_config_rejects_bad_ranges() {
        let zero_intake = CONFIG_JSON.replacen("\"intake_orders_per_sec\": 2", "\"intake_orders_per_sec\": 0", 1);
        assert!(parse_config(&zero_intake).is_err());

        let min_above_max = CONFIG_JSON.replacen("\"pickup_min_sec\": 2", "\"pickup_min_sec\": 7", 1);
        assert!(parse_config(&min_above_max).is_err());

        let zero_cleanup = CONFIG_JSON.replacen("\"cleanup_delay\": 1.0", "\"cleanup_delay\": 0.0", 1);
        assert!(parse_config(&zero_cleanup).is_err());
    }

    #[test]
    fn parse_orders_ok() {
        let orders = parse_orders(ORDERS_JSON).unwrap();

        assert_eq!(orders.len(), 3);
        assert_eq!(orders[0].id, "a8cfcb76");
        assert_eq!(orders[0].temp, Temp::Frozen);
        assert_eq!(orders[0].shelf_life, 20);
        assert_eq!(orders[0].decay_rate, 0.63);
        assert_eq!(orders[2].temp, Temp::Cold);
    }

    #[test]
    fn parse_orders_rejects_unknown_temp() {
        let text = ORDERS_JSON.replacen("\"cold\"", "\"tepid\"", 1);
        assert!(parse_orders(&text).is_err());
    }

    #[test]
    fn parse_orders_rejects_bad_numbers() {
        let zero_life = ORDERS_JSON.replacen("\"shelfLife\": 20", "\"shelfLife\": 0", 1);
        assert!(parse_orders(&zero_life).is_err());

        let negative_decay = ORDERS_JSON.replacen("\"decayRate\": 0.63", "\"decayRate\": -0.63", 1);
        assert!(parse_orders(&negative_decay).is_err());
    }

    #[test]
    fn parse_orders_accepts_zero_decay() {
        let text = ORDERS_JSON.replacen("\"decayRate\": 0.63", "\"decayRate\": 0.0", 1);
        let orders = parse_orders(&text).unwrap();
        assert_eq!(orders[0].decay_rate, 0.0);
    }

    #[test]
    fn load_orders_truncates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ORDERS_JSON.as_bytes()).unwrap();

        let orders = load_orders(file.path(), 2).unwrap();
        assert_eq!(orders.len(), 2);

        let orders = load_orders(file.path(), DEFAULT_MAX_ORDERS).unwrap();
        assert_eq!(orders.len(), 3);
    }

    #[test]
    fn load_missing_file_fails() {
        let path = Path::new("/nonexistent/orders.json");
        let err = load_orders(path, DEFAULT_MAX_ORDERS).unwrap_err();
        assert!(err.to_string().contains("orders.json"));

        assert!(load_config(Path::new("/nonexistent/config.json")).is_err());
    }
}
