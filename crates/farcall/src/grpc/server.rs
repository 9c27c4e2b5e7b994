//! Server assembly: plumbs the transport configuration into the tonic
//! builder, installs the metadata interceptor, and optionally registers
//! server reflection.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tonic::service::interceptor::InterceptedService;
use tonic::transport::server::{Connected, Router, Server};
use tracing::info;

use crate::auth::Authenticator;
use crate::config::FarcallConfig;
use crate::error::{Error, Result};
use crate::grpc::interceptor;
use crate::grpc::proto;
use crate::grpc::service::MemberServiceImpl;
use crate::registry::Registry;

/// The member gateway server.
pub struct FarcallServer {
    config: FarcallConfig,
    registry: Arc<Registry>,
    auth: Arc<Authenticator>,
}

impl FarcallServer {
    pub fn new(config: FarcallConfig, registry: Arc<Registry>) -> Self {
        let auth = Arc::new(Authenticator::from_config(&config.security));
        Self { config, registry, auth }
    }

    /// Serve on `0.0.0.0:<port>` until the process exits.
    pub async fn serve(self) -> Result<()> {
        if !self.config.transport.enabled {
            info!("farcall: transport disabled; not serving");
            return Ok(());
        }
        let addr: SocketAddr = format!("0.0.0.0:{}", self.config.transport.port)
            .parse()
            .map_err(|err| Error::Transport(format!("bad listen address: {err}")))?;
        self.log_startup(&addr);
        let router = self.router()?;
        router
            .serve(addr)
            .await
            .map_err(|err| Error::Transport(err.to_string()))
    }

    /// Serve until `signal` resolves, then drain in-flight calls.
    pub async fn serve_with_shutdown(
        self,
        signal: impl std::future::Future<Output = ()>,
    ) -> Result<()> {
        if !self.config.transport.enabled {
            info!("farcall: transport disabled; not serving");
            return Ok(());
        }
        let addr: SocketAddr = format!("0.0.0.0:{}", self.config.transport.port)
            .parse()
            .map_err(|err| Error::Transport(format!("bad listen address: {err}")))?;
        self.log_startup(&addr);
        let router = self.router()?;
        router
            .serve_with_shutdown(addr, signal)
            .await
            .map_err(|err| Error::Transport(err.to_string()))
    }

    /// Serve over an externally provided connection stream. This is how
    /// tests drive the server on an ephemeral listener.
    pub async fn serve_with_incoming<I, IO, IE>(self, incoming: I) -> Result<()>
    where
        I: tokio_stream::Stream<Item = std::result::Result<IO, IE>>,
        IO: tokio::io::AsyncRead + tokio::io::AsyncWrite + Connected + Unpin + Send + 'static,
        IO::ConnectInfo: Clone + Send + Sync + 'static,
        IE: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let router = self.router()?;
        router
            .serve_with_incoming(incoming)
            .await
            .map_err(|err| Error::Transport(err.to_string()))
    }

    fn log_startup(&self, addr: &SocketAddr) {
        let transport = &self.config.transport;
        let security = &self.config.security;
        info!("farcall: member gateway listening on {addr}");
        info!(
            "farcall:   reflection={} keepalive={}s/{}s max_message={}B max_calls={}",
            transport.enable_reflection,
            transport.keepalive_time_secs,
            transport.keepalive_timeout_secs,
            transport.max_inbound_message_size,
            transport.max_concurrent_calls,
        );
        info!(
            "farcall:   security={} token-family={} key-family={}",
            security.enabled, security.token.enabled, security.key.enabled,
        );
    }

    fn router(self) -> Result<Router> {
        let transport = &self.config.transport;

        let service = MemberServiceImpl::new(self.registry.clone(), self.auth.clone());
        let mut grpc = proto::member_service_server::MemberServiceServer::new(service);
        if transport.max_inbound_message_size > 0 {
            grpc = grpc.max_decoding_message_size(transport.max_inbound_message_size);
        }
        let intercepted = InterceptedService::new(
            grpc,
            interceptor::credentials(self.config.security.key.header_name.clone()),
        );

        let mut builder = Server::builder();
        if transport.keepalive_time_secs > 0 {
            builder = builder
                .http2_keepalive_interval(Some(Duration::from_secs(transport.keepalive_time_secs)));
        }
        if transport.keepalive_timeout_secs > 0 {
            builder = builder.http2_keepalive_timeout(Some(Duration::from_secs(
                transport.keepalive_timeout_secs,
            )));
        }
        if transport.max_concurrent_calls > 0 {
            builder =
                builder.concurrency_limit_per_connection(transport.max_concurrent_calls as usize);
        }

        let mut router = builder.add_service(intercepted);

        if transport.enable_reflection {
            let reflection = tonic_reflection::server::Builder::configure()
                .register_encoded_file_descriptor_set(proto::FILE_DESCRIPTOR_SET)
                .build_v1()
                .map_err(|err| Error::Config(format!("reflection: {err}")))?;
            router = router.add_service(reflection);
        }

        Ok(router)
    }
}
