//! gRPC surface: generated wire types, metadata interceptor, the
//! four-operation service, and server assembly.

/// Generated protobuf types and service traits.
pub mod proto {
    tonic::include_proto!("farcall.v1");

    /// Compiled descriptor set, used for server reflection.
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("farcall_descriptor");
}

pub mod interceptor;
pub mod server;
pub mod service;
pub mod value;

pub use server::FarcallServer;
pub use service::MemberServiceImpl;
