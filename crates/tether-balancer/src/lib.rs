//! Tether Load Balancer
//!
//! A [`LoadBalancer`] is a dispatcher that relays calls it cannot answer
//! itself: any call whose method name is registered locally executes
//! locally, exactly as a plain server would; every other call is forwarded
//! to one of several backend connections chosen round robin, and the
//! backend's outcome is passed back to the original caller unmodified.
//!
//! # Example
//!
//! ```no_run
//! use tether_balancer::{Backend, BalancerOptions, LoadBalancer};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let balancer = LoadBalancer::bind(
//!     vec![Backend::new("127.0.0.1", 4201), Backend::new("127.0.0.1", 4202)],
//!     4200,
//!     BalancerOptions::default(),
//! )
//! .await?;
//! balancer.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod balancer;

pub use balancer::{Backend, BalancerOptions, LoadBalancer};
