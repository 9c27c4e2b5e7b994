//! Discovery payload: describes every canonical member so clients can
//! learn signatures. Alias forms are never emitted.

use crate::grpc::proto;
use crate::member::{MemberDef, MemberKind};
use crate::registry::Registry;

/// Build the full discovery response, ordered by scan order.
pub fn describe(registry: &Registry) -> proto::DescribeResponse {
    proto::DescribeResponse {
        members: registry.members().map(|def| member_info(def)).collect(),
    }
}

fn member_info(def: &MemberDef) -> proto::MemberInfo {
    let kind = match def.kind {
        MemberKind::Callable => proto::MemberKind::Callable,
        MemberKind::Datum => proto::MemberKind::Datum,
    };
    proto::MemberInfo {
        container_name: def.container_name.clone(),
        member_name: def.member_name.clone(),
        secured: def.secured,
        return_type_name: def.return_type_name.clone(),
        parameters: def
            .parameters
            .iter()
            .map(|p| proto::ParameterInfo {
                name: p.name.clone(),
                type_name: p.type_name.clone(),
                index: p.index,
            })
            .collect(),
        description: def.description.clone(),
        kind: kind as i32,
        writeable: def.writeable(),
        r#static: def.is_static,
        immutable: def.immutable,
    }
}
