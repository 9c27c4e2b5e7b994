//! Shared fixtures: exposable containers and a server harness.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use farcall::grpc::proto;
use farcall::grpc::value::{json_to_proto, proto_to_json};
use farcall::{container, members, DatumCell, FarcallConfig, FarcallServer, Registry};
use serde_json::Value;
use tonic::transport::{Channel, Endpoint};

pub type Client = proto::member_service_client::MemberServiceClient<Channel>;

// ============================================================================
// Containers
// ============================================================================

#[container(aliases(api::Greeting))]
pub struct Greeter;

#[members]
impl Greeter {
    #[expose(description = "Says hello")]
    pub fn hi(&self) -> String {
        "hello".to_owned()
    }
}

#[container]
pub struct Math;

#[members]
impl Math {
    #[expose(name = "square", description = "Squares a number")]
    pub fn square_int(&self, n: i64) -> i64 {
        n * n
    }

    #[expose(name = "square", description = "Doubles a string")]
    pub fn square_text(&self, s: String) -> String {
        s.repeat(2)
    }

    #[expose]
    pub fn echo(&self, n: i64) -> i64 {
        n
    }

    #[expose]
    pub fn reset(&self) {}
}

#[container]
pub struct Text;

#[members]
impl Text {
    #[expose(name = "wrap")]
    pub fn wrap_text(&self, value: String) -> String {
        format!("[{value}]")
    }

    #[expose(name = "wrap")]
    pub fn wrap_flag(&self, value: bool) -> String {
        format!("<{value}>")
    }
}

#[container]
pub struct Build {
    #[expose(description = "Release version", immutable)]
    version: String,

    #[expose(description = "Log level")]
    level: DatumCell<String>,
}

impl Default for Build {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_owned(),
            level: DatumCell::new("info".to_owned()),
        }
    }
}

#[members]
impl Build {
    #[expose(description = "Build codename")]
    pub const CODENAME: &'static str = "aurora";

    #[expose(description = "Target platform")]
    pub fn platform() -> String {
        "linux".to_owned()
    }
}

#[container]
pub struct Jobs;

#[members]
impl Jobs {
    #[expose]
    pub async fn ready(&self) -> String {
        "ready".to_owned()
    }

    #[expose]
    pub async fn failing(&self) -> Result<String, std::io::Error> {
        Err(std::io::Error::other("fail"))
    }
}

#[container]
pub struct Secrets {
    #[expose(secured = "key", description = "Rotation pin")]
    pin: DatumCell<String>,

    #[expose(secured = "key", immutable)]
    seal: DatumCell<String>,
}

impl Default for Secrets {
    fn default() -> Self {
        Self {
            pin: DatumCell::new("0000".to_owned()),
            seal: DatumCell::new("wax".to_owned()),
        }
    }
}

#[members]
impl Secrets {
    #[expose(secured = "token")]
    pub fn token_only(&self) -> String {
        "t-secret".to_owned()
    }

    #[expose(secured = "key")]
    pub fn key_only(&self) -> String {
        "k-secret".to_owned()
    }

    #[expose(secured = "either")]
    pub fn either(&self) -> String {
        "e-secret".to_owned()
    }

    #[expose(secured)]
    pub fn default_family(&self) -> String {
        "d-secret".to_owned()
    }

    #[expose]
    pub fn open(&self) -> String {
        "open".to_owned()
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Start the gateway on an ephemeral port; returns the bound address.
pub async fn start_server(config: FarcallConfig, registry: Registry) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);
    let server = FarcallServer::new(config, Arc::new(registry));
    tokio::spawn(async move {
        let _ = server.serve_with_incoming(incoming).await;
    });
    addr
}

pub fn client(addr: SocketAddr) -> Client {
    let channel = Endpoint::from_shared(format!("http://{addr}"))
        .unwrap()
        .connect_lazy();
    Client::new(channel)
}

pub fn invoke_request(container: &str, member: &str, args: Vec<Value>) -> proto::InvokeRequest {
    proto::InvokeRequest {
        container_name: container.to_owned(),
        member_name: member.to_owned(),
        arguments: Some(prost_types::ListValue {
            values: args.into_iter().map(json_to_proto).collect(),
        }),
        parameter_type_names: Vec::new(),
    }
}

pub fn write_request(container: &str, datum: &str, value: Value) -> proto::WriteRequest {
    proto::WriteRequest {
        container_name: container.to_owned(),
        datum_name: datum.to_owned(),
        value: Some(json_to_proto(value)),
    }
}

pub fn result_json(response: proto::InvokeResponse) -> Value {
    proto_to_json(response.result.expect("response carries a result"))
}

pub fn previous_json(response: proto::WriteResponse) -> Value {
    proto_to_json(response.previous_value.expect("response carries the previous value"))
}
