//! Expansion of `#[members]` on an inherent impl block: the callable
//! member table for `#[expose]`d methods, plus static immutable datums
//! for `#[expose]`d associated constants.

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{FnArg, ImplItem, ItemImpl, Pat, ReturnType, Type};

use crate::util::{classify_param, parse_expose, short_type_name, strip_expose, ExposeArgs};

/// How a method's declared result is turned into an outcome.
enum ReturnKind {
    /// No declared result; yields the accepted sentinel.
    Void,
    /// `-> T`
    Plain(Type),
    /// `-> Result<(), E>`
    ResultVoid,
    /// `-> Result<T, E>`
    ResultPlain(Type),
    /// `#[expose(stream)]`: the result is a stream whose items are collected.
    Stream(Type),
}

pub fn expand(args: TokenStream, input: TokenStream) -> syn::Result<TokenStream> {
    if !args.is_empty() {
        return Err(syn::Error::new_spanned(args, "#[members] takes no arguments"));
    }
    let mut item: ItemImpl = syn::parse2(input)?;

    if item.trait_.is_some() {
        return Err(syn::Error::new_spanned(
            &item,
            "#[members] applies to inherent impl blocks, not trait impls",
        ));
    }
    if !item.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &item.generics,
            "#[members] does not support generic containers",
        ));
    }

    let self_ty = (*item.self_ty).clone();
    let Type::Path(self_path) = &self_ty else {
        return Err(syn::Error::new_spanned(
            &self_ty,
            "#[members] needs a plain type path",
        ));
    };
    let self_ident = self_path
        .path
        .segments
        .last()
        .map(|segment| segment.ident.clone())
        .ok_or_else(|| syn::Error::new_spanned(&self_ty, "empty type path"))?;

    let mut pushes = Vec::new();

    for impl_item in &mut item.items {
        match impl_item {
            ImplItem::Fn(method) => {
                let Some(expose) = parse_expose(&method.attrs)? else {
                    continue;
                };
                strip_expose(&mut method.attrs);
                pushes.push(expand_method(&self_ty, method, expose)?);
            }
            ImplItem::Const(constant) => {
                let Some(expose) = parse_expose(&constant.attrs)? else {
                    continue;
                };
                strip_expose(&mut constant.attrs);
                pushes.push(expand_const(&self_ty, constant, expose)?);
            }
            _ => {}
        }
    }

    let table = if pushes.is_empty() {
        TokenStream::new()
    } else {
        let table_fn =
            format_ident!("__farcall_callables_{}", self_ident.to_string().to_lowercase());
        let table_static =
            format_ident!("__FARCALL_CALLABLES_{}", self_ident.to_string().to_uppercase());
        quote! {
            #[doc(hidden)]
            #[allow(unused_variables)]
            fn #table_fn(
                instance: &::farcall::registry::ArcAny,
            ) -> ::std::vec::Vec<::farcall::member::MemberDef> {
                let Ok(__instance) =
                    ::std::sync::Arc::clone(instance).downcast::<#self_ty>()
                else {
                    return ::std::vec::Vec::new();
                };
                let mut members = ::std::vec::Vec::new();
                #(#pushes)*
                members
            }

            #[doc(hidden)]
            #[::farcall::linkme::distributed_slice(::farcall::registry::MEMBER_TABLES)]
            static #table_static: ::farcall::registry::MemberTable =
                ::farcall::registry::MemberTable {
                    type_id: || ::std::any::TypeId::of::<#self_ty>(),
                    rank: ::farcall::registry::TableRank::Callables,
                    members: #table_fn,
                };
        }
    };

    Ok(quote! {
        #item

        #table
    })
}

fn expand_method(
    self_ty: &Type,
    method: &syn::ImplItemFn,
    expose: ExposeArgs,
) -> syn::Result<TokenStream> {
    let signature = &method.sig;
    let fn_ident = signature.ident.clone();
    let member_name = expose.name.unwrap_or_else(|| fn_ident.to_string());
    let description = expose.description;
    let secured = expose.secured.is_some();
    let family = match expose.secured {
        Some(family) => {
            let tokens = family.tokens();
            quote!(::std::option::Option::Some(#tokens))
        }
        None => quote!(::std::option::Option::None),
    };

    let is_static = signature.receiver().is_none();
    if let Some(receiver) = signature.receiver() {
        if receiver.reference.is_none() || receiver.mutability.is_some() {
            return Err(syn::Error::new_spanned(
                receiver,
                "exposed methods take &self (or no receiver for static members)",
            ));
        }
    }
    let is_async = signature.asyncness.is_some();

    // Formal parameters, skipping the receiver.
    let mut specs = Vec::new();
    let mut decodes = Vec::new();
    let mut call_args = Vec::new();
    let typed_inputs = signature.inputs.iter().filter_map(|input| match input {
        FnArg::Typed(typed) => Some(typed),
        FnArg::Receiver(_) => None,
    });
    for (index, input) in typed_inputs.enumerate() {
        let param_name = match &*input.pat {
            Pat::Ident(pat) => pat.ident.to_string(),
            _ => format!("arg{index}"),
        };
        let class = classify_param(&input.ty)?;
        let short = class.short;
        let shape = class.shape.tokens();
        let nullable = class.nullable;
        let index = index as u32;
        specs.push(quote! {
            ::farcall::member::ParameterSpec {
                name: #param_name.to_owned(),
                type_name: #short.to_owned(),
                index: #index,
                shape: #shape,
                nullable: #nullable,
            }
        });

        let var = format_ident!("__arg{index}");
        let ty = &input.ty;
        decodes.push(quote! {
            let #var: #ty = match __iter.next() {
                ::std::option::Option::Some(value) => {
                    ::farcall::dispatch::decode_arg(#param_name, value)?
                }
                ::std::option::Option::None => {
                    return ::std::result::Result::Err(::farcall::member::CallFault::marshal(
                        ::std::concat!("missing argument '", #param_name, "'"),
                    ))
                }
            };
        });
        call_args.push(var);
    }

    let return_kind = classify_return(&signature.output, expose.stream);
    let return_type_name = match &return_kind {
        ReturnKind::Void | ReturnKind::ResultVoid => "void".to_owned(),
        ReturnKind::Plain(ty) | ReturnKind::ResultPlain(ty) | ReturnKind::Stream(ty) => {
            short_type_name(ty)
        }
    };

    let call = if is_static {
        quote!(<#self_ty>::#fn_ident(#(#call_args),*))
    } else {
        quote!(this.#fn_ident(#(#call_args),*))
    };
    let call = if is_async { quote!(#call.await) } else { call };

    let body_tail = match &return_kind {
        ReturnKind::Void => quote! {
            #call;
            ::std::result::Result::Ok(::farcall::member::Outcome::Accepted)
        },
        ReturnKind::Plain(_) => quote! {
            let __out = #call;
            ::farcall::dispatch::encode_outcome(&__out)
        },
        ReturnKind::ResultVoid => quote! {
            match #call {
                ::std::result::Result::Ok(()) => {
                    ::std::result::Result::Ok(::farcall::member::Outcome::Accepted)
                }
                ::std::result::Result::Err(err) => ::std::result::Result::Err(
                    ::farcall::member::CallFault::target(err),
                ),
            }
        },
        ReturnKind::ResultPlain(_) => quote! {
            match #call {
                ::std::result::Result::Ok(value) => ::farcall::dispatch::encode_outcome(&value),
                ::std::result::Result::Err(err) => ::std::result::Result::Err(
                    ::farcall::member::CallFault::target(err),
                ),
            }
        },
        ReturnKind::Stream(_) => quote! {
            let __out = #call;
            ::farcall::dispatch::collect_stream(__out).await
        },
    };

    let iter_setup = if decodes.is_empty() {
        TokenStream::new()
    } else {
        quote!(let mut __iter = __args.into_iter();)
    };
    let args_pat = if decodes.is_empty() {
        quote!(_: ::std::vec::Vec<::farcall::serde_json::Value>)
    } else {
        quote!(__args: ::std::vec::Vec<::farcall::serde_json::Value>)
    };

    let invoke = if is_static {
        quote! {
            ::std::sync::Arc::new(move |#args_pat| {
                ::std::boxed::Box::pin(async move {
                    #iter_setup
                    #(#decodes)*
                    #body_tail
                })
            })
        }
    } else {
        quote! {{
            let this = ::std::sync::Arc::clone(&__instance);
            ::std::sync::Arc::new(move |#args_pat| {
                let this = ::std::sync::Arc::clone(&this);
                ::std::boxed::Box::pin(async move {
                    #iter_setup
                    #(#decodes)*
                    #body_tail
                })
            })
        }}
    };

    Ok(quote! {
        members.push(::farcall::member::MemberDef {
            container_name: ::farcall::registry::Container::container_name(&*__instance)
                .to_owned(),
            member_name: #member_name.to_owned(),
            kind: ::farcall::member::MemberKind::Callable,
            secured: #secured,
            credential_family: #family,
            immutable: true,
            is_static: #is_static,
            parameters: ::std::vec![#(#specs),*],
            return_type_name: #return_type_name.to_owned(),
            description: #description.to_owned(),
            handler: ::farcall::member::Handler::Callable { invoke: #invoke },
        });
    })
}

fn expand_const(
    self_ty: &Type,
    constant: &syn::ImplItemConst,
    expose: ExposeArgs,
) -> syn::Result<TokenStream> {
    let const_ident = constant.ident.clone();
    let member_name = expose
        .name
        .unwrap_or_else(|| const_ident.to_string().to_lowercase());
    let description = expose.description;
    let secured = expose.secured.is_some();
    let family = match expose.secured {
        Some(family) => {
            let tokens = family.tokens();
            quote!(::std::option::Option::Some(#tokens))
        }
        None => quote!(::std::option::Option::None),
    };
    let type_name = short_type_name(&constant.ty);

    Ok(quote! {
        members.push(::farcall::member::MemberDef {
            container_name: ::farcall::registry::Container::container_name(&*__instance)
                .to_owned(),
            member_name: #member_name.to_owned(),
            kind: ::farcall::member::MemberKind::Datum,
            secured: #secured,
            credential_family: #family,
            immutable: true,
            is_static: true,
            parameters: ::std::vec::Vec::new(),
            return_type_name: #type_name.to_owned(),
            description: #description.to_owned(),
            handler: ::farcall::member::Handler::Datum {
                read: ::std::sync::Arc::new(|| {
                    ::farcall::dispatch::encode_value(&<#self_ty>::#const_ident)
                }),
                write: ::std::option::Option::None,
            },
        });
    })
}

fn classify_return(output: &ReturnType, stream: bool) -> ReturnKind {
    let ty = match output {
        ReturnType::Default => return ReturnKind::Void,
        ReturnType::Type(_, ty) => (**ty).clone(),
    };
    if stream {
        return ReturnKind::Stream(ty);
    }
    if let Type::Tuple(tuple) = &ty {
        if tuple.elems.is_empty() {
            return ReturnKind::Void;
        }
    }
    if let Type::Path(path) = &ty {
        if let Some(segment) = path.path.segments.last() {
            if segment.ident == "Result" {
                if let Some(inner) = crate::util::first_generic_arg(&segment.arguments) {
                    if let Type::Tuple(tuple) = inner {
                        if tuple.elems.is_empty() {
                            return ReturnKind::ResultVoid;
                        }
                    }
                    return ReturnKind::ResultPlain(inner.clone());
                }
                // `Result` with no explicit arguments: treat the payload as
                // opaque and serialize whatever comes out.
                return ReturnKind::ResultPlain(ty.clone());
            }
        }
    }
    ReturnKind::Plain(ty)
}
