use serde::Deserialize;
use std::fmt;

/// Slice differentiator, written as six hex digits in configuration.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sd(#[serde(with = "hex")] pub [u8; 3]);

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Snssai {
    pub sst: u8,
    #[serde(default)]
    pub sd: Option<Sd>,
}

impl Snssai {
    pub fn new(sst: u8, sd: Option<[u8; 3]>) -> Self {
        Snssai { sst, sd: sd.map(Sd) }
    }
}

impl fmt::Display for Snssai {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sd {
            Some(Sd(sd)) => write!(f, "{}-{}", self.sst, hex::encode(sd)),
            None => write!(f, "{}", self.sst),
        }
    }
}
