//! Strategy: which discovered sales the agent is willing to buy.

pub mod policy;

pub use policy::{from_config, AcceptancePolicy, AllOf, ArtistAllowList, PriceCeiling};
