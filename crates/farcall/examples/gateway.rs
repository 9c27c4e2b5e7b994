//! Minimal gateway: exposes one container and serves it.
//!
//! Run with `cargo run --example gateway`, then poke it with grpcurl:
//!
//! ```text
//! grpcurl -plaintext -d '{"containerName":"Greeter","memberName":"hi"}' \
//!     localhost:9090 farcall.v1.MemberService/InvokeCallable
//! ```

use std::sync::Arc;

use farcall::{container, members, DatumCell, FarcallConfig, FarcallServer, RegistryBuilder};

#[container(aliases(Greeting))]
pub struct Greeter {
    #[expose(description = "Prefix used by greet")]
    prefix: DatumCell<String>,
}

#[members]
impl Greeter {
    #[expose(description = "Says hello")]
    fn hi(&self) -> String {
        "hello".to_owned()
    }

    #[expose(description = "Greets a name with the configured prefix")]
    fn greet(&self, name: String) -> String {
        self.prefix.with(|prefix| format!("{prefix} {name}"))
    }
}

#[tokio::main]
async fn main() -> farcall::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let registry = RegistryBuilder::default()
        .register(Arc::new(Greeter { prefix: DatumCell::new("hey".to_owned()) }))
        .scan();

    let config = FarcallConfig::default().from_env();
    FarcallServer::new(config, Arc::new(registry)).serve().await
}
