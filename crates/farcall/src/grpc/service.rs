//! The four-operation gRPC service.
//!
//! Every operation runs the same per-call pipeline: read credentials from
//! the call extensions, resolve the member, authorize, dispatch, convert
//! the result. The bidirectional stream reuses the unary pipeline per
//! message.

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, error};

use crate::auth::{Authenticator, CredentialContext};
use crate::dispatch::{ambiguity_message, Dispatcher};
use crate::error::Error;
use crate::grpc::proto;
use crate::grpc::value::{arguments_to_json, json_to_proto, proto_to_json};
use crate::introspect;
use crate::member::{MemberDef, MemberKind};
use crate::registry::{Lookup, Registry};

/// Serves the member gateway over a frozen registry.
#[derive(Clone)]
pub struct MemberServiceImpl {
    registry: Arc<Registry>,
    dispatcher: Dispatcher,
    auth: Arc<Authenticator>,
}

impl MemberServiceImpl {
    pub fn new(registry: Arc<Registry>, auth: Arc<Authenticator>) -> Self {
        Self { registry, dispatcher: Dispatcher, auth }
    }

    /// Resolve an invoke target, narrowing ambiguous overload sets by
    /// argument shape before giving up.
    fn resolve_invoke(
        &self,
        container: &str,
        member: &str,
        parameter_types: &[String],
        args: &[serde_json::Value],
    ) -> Result<Arc<MemberDef>, Error> {
        match self.registry.resolve(container, member, parameter_types) {
            Lookup::Member(def) => Ok(def),
            Lookup::NotFound => Err(Error::NotFound(format!("{container}.{member}"))),
            Lookup::Ambiguous(candidates) => self
                .dispatcher
                .infer_overload(&candidates, args)
                .ok_or_else(|| {
                    Error::Ambiguous(ambiguity_message(container, member, &candidates))
                }),
        }
    }

    /// The unary invoke pipeline, shared with the streaming handler.
    async fn handle_invoke(
        &self,
        request: proto::InvokeRequest,
        creds: &CredentialContext,
    ) -> Result<proto::InvokeResponse, Status> {
        let args = arguments_to_json(request.arguments);
        let member = self.resolve_invoke(
            &request.container_name,
            &request.member_name,
            &request.parameter_type_names,
            &args,
        )?;
        self.auth.authorize(&member, creds).await?;
        let result = self.dispatcher.invoke(&member, args).await?;
        Ok(proto::InvokeResponse { result: Some(json_to_proto(result)) })
    }

    fn credentials(extensions: &tonic::Extensions) -> CredentialContext {
        extensions.get::<CredentialContext>().cloned().unwrap_or_default()
    }
}

type InvokeStream =
    Pin<Box<dyn Stream<Item = Result<proto::InvokeResponse, Status>> + Send + 'static>>;

#[tonic::async_trait]
impl proto::member_service_server::MemberService for MemberServiceImpl {
    async fn invoke_callable(
        &self,
        request: Request<proto::InvokeRequest>,
    ) -> Result<Response<proto::InvokeResponse>, Status> {
        let creds = Self::credentials(request.extensions());
        let request = request.into_inner();
        debug!(
            "farcall: InvokeCallable {}.{}",
            request.container_name, request.member_name
        );
        let response = self.handle_invoke(request, &creds).await?;
        Ok(Response::new(response))
    }

    async fn write_datum(
        &self,
        request: Request<proto::WriteRequest>,
    ) -> Result<Response<proto::WriteResponse>, Status> {
        let creds = Self::credentials(request.extensions());
        let request = request.into_inner();
        debug!(
            "farcall: WriteDatum {}.{}",
            request.container_name, request.datum_name
        );

        let member = match self
            .registry
            .resolve(&request.container_name, &request.datum_name, &[])
        {
            Lookup::Member(def) => def,
            // An overload set under this name means the target is a callable.
            Lookup::Ambiguous(_) => {
                return Err(Error::WrongKindForWrite(format!(
                    "{}.{}",
                    request.container_name, request.datum_name
                ))
                .into())
            }
            Lookup::NotFound => {
                return Err(Error::NotFound(format!(
                    "{}.{}",
                    request.container_name, request.datum_name
                ))
                .into())
            }
        };

        if member.kind == MemberKind::Callable {
            return Err(Error::WrongKindForWrite(member.base_key()).into());
        }

        // Credentials gate before the immutable check.
        self.auth.authorize(&member, &creds).await?;

        let value = request.value.map(proto_to_json).unwrap_or(serde_json::Value::Null);
        let previous = self.dispatcher.write(&member, value)?;
        Ok(Response::new(proto::WriteResponse {
            previous_value: Some(json_to_proto(previous)),
        }))
    }

    async fn describe_all(
        &self,
        _request: Request<proto::DescribeRequest>,
    ) -> Result<Response<proto::DescribeResponse>, Status> {
        Ok(Response::new(introspect::describe(&self.registry)))
    }

    type InvokeCallableStreamStream = InvokeStream;

    /// Credentials are read once at stream open; a long-lived stream
    /// cannot renew an expired token. Requests are processed serially and
    /// responses preserve request order.
    async fn invoke_callable_stream(
        &self,
        request: Request<Streaming<proto::InvokeRequest>>,
    ) -> Result<Response<Self::InvokeCallableStreamStream>, Status> {
        let creds = Self::credentials(request.extensions());
        let mut inbound = request.into_inner();
        let service = self.clone();
        let (tx, rx) = mpsc::channel(16);

        tokio::spawn(async move {
            loop {
                match inbound.message().await {
                    Ok(Some(next)) => {
                        let item = service.handle_invoke(next, &creds).await;
                        let failed = item.is_err();
                        if tx.send(item).await.is_err() {
                            break;
                        }
                        if failed {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(status) => {
                        error!("farcall: invocation stream error: {status}");
                        let _ = tx.send(Err(status)).await;
                        break;
                    }
                }
            }
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}
