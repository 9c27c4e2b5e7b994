//! Expansion of `#[container]` on a struct: the `Container` impl plus the
//! datum member table for `#[expose]`d fields.

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{Expr, ExprLit, Fields, ItemStruct, Lit, Meta, Token};

use crate::util::{
    self, first_generic_arg, last_segment_is, parse_expose, short_type_name, strip_expose,
};

/// `#[container(name = "...", aliases(path, ...))]`
struct ContainerArgs {
    name: Option<String>,
    aliases: Vec<String>,
}

impl Parse for ContainerArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut args = ContainerArgs { name: None, aliases: Vec::new() };
        let metas = Punctuated::<Meta, Token![,]>::parse_terminated(input)?;
        for meta in metas {
            match &meta {
                Meta::NameValue(nv) if nv.path.is_ident("name") => {
                    if let Expr::Lit(ExprLit { lit: Lit::Str(s), .. }) = &nv.value {
                        args.name = Some(s.value());
                    } else {
                        return Err(syn::Error::new_spanned(&nv.value, "expected a string literal"));
                    }
                }
                Meta::List(list) if list.path.is_ident("aliases") => {
                    let paths = list
                        .parse_args_with(Punctuated::<syn::Path, Token![,]>::parse_terminated)?;
                    for path in paths {
                        args.aliases.push(util::path_to_string(&path));
                    }
                }
                other => {
                    return Err(syn::Error::new_spanned(
                        other,
                        "unsupported container argument (expected name or aliases)",
                    ))
                }
            }
        }
        Ok(args)
    }
}

pub fn expand(args: TokenStream, input: TokenStream) -> syn::Result<TokenStream> {
    let args: ContainerArgs = syn::parse2(args)?;
    let mut item: ItemStruct = syn::parse2(input)?;

    if !item.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &item.generics,
            "#[container] does not support generic containers",
        ));
    }

    let ident = item.ident.clone();
    let container_name = args.name.unwrap_or_else(|| ident.to_string());
    let alias_literals = args.aliases;

    let mut datum_pushes = Vec::new();

    if let Fields::Named(fields) = &mut item.fields {
        for field in &mut fields.named {
            let Some(expose) = parse_expose(&field.attrs)? else {
                continue;
            };
            strip_expose(&mut field.attrs);

            let field_ident = field
                .ident
                .clone()
                .expect("named fields always carry an identifier");
            let member_name = expose.name.unwrap_or_else(|| field_ident.to_string());
            let description = expose.description;
            let secured = expose.secured.is_some();
            let family = match expose.secured {
                Some(family) => {
                    let tokens = family.tokens();
                    quote!(::std::option::Option::Some(#tokens))
                }
                None => quote!(::std::option::Option::None),
            };

            let is_cell = last_segment_is(&field.ty, "DatumCell");
            let declared_ty = if is_cell {
                let syn::Type::Path(path) = &field.ty else {
                    unreachable!("cell fields are path types");
                };
                first_generic_arg(&path.path.segments.last().unwrap().arguments)
                    .ok_or_else(|| {
                        syn::Error::new_spanned(&field.ty, "DatumCell needs a type argument")
                    })?
                    .clone()
            } else {
                field.ty.clone()
            };
            let type_name = short_type_name(&declared_ty);

            // Plain fields have no write path; a cell field may still be
            // declared immutable to refuse writes at the dispatcher.
            let immutable = !is_cell || expose.immutable;

            let read = if is_cell {
                quote! {{
                    let this = ::std::sync::Arc::clone(&__instance);
                    ::std::sync::Arc::new(move || {
                        this.#field_ident.with(|value| ::farcall::dispatch::encode_value(value))
                    })
                }}
            } else {
                quote! {{
                    let this = ::std::sync::Arc::clone(&__instance);
                    ::std::sync::Arc::new(move || ::farcall::dispatch::encode_value(&this.#field_ident))
                }}
            };

            let write = if is_cell && !immutable {
                quote! {
                    ::std::option::Option::Some({
                        let this = ::std::sync::Arc::clone(&__instance);
                        ::std::sync::Arc::new(move |value: ::farcall::serde_json::Value| {
                            let next = ::farcall::dispatch::decode_arg(#member_name, value)?;
                            ::farcall::dispatch::encode_value(&this.#field_ident.set(next))
                        })
                    })
                }
            } else {
                quote!(::std::option::Option::None)
            };

            datum_pushes.push(quote! {
                members.push(::farcall::member::MemberDef {
                    container_name: #container_name.to_owned(),
                    member_name: #member_name.to_owned(),
                    kind: ::farcall::member::MemberKind::Datum,
                    secured: #secured,
                    credential_family: #family,
                    immutable: #immutable,
                    is_static: false,
                    parameters: ::std::vec::Vec::new(),
                    return_type_name: #type_name.to_owned(),
                    description: #description.to_owned(),
                    handler: ::farcall::member::Handler::Datum { read: #read, write: #write },
                });
            });
        }
    }

    let table = if datum_pushes.is_empty() {
        TokenStream::new()
    } else {
        let table_fn = format_ident!("__farcall_datums_{}", ident.to_string().to_lowercase());
        let table_static =
            format_ident!("__FARCALL_DATUMS_{}", ident.to_string().to_uppercase());
        quote! {
            #[doc(hidden)]
            #[allow(non_snake_case)]
            fn #table_fn(
                instance: &::farcall::registry::ArcAny,
            ) -> ::std::vec::Vec<::farcall::member::MemberDef> {
                let Ok(__instance) =
                    ::std::sync::Arc::clone(instance).downcast::<#ident>()
                else {
                    return ::std::vec::Vec::new();
                };
                let mut members = ::std::vec::Vec::new();
                #(#datum_pushes)*
                members
            }

            #[doc(hidden)]
            #[::farcall::linkme::distributed_slice(::farcall::registry::MEMBER_TABLES)]
            static #table_static: ::farcall::registry::MemberTable =
                ::farcall::registry::MemberTable {
                    type_id: || ::std::any::TypeId::of::<#ident>(),
                    rank: ::farcall::registry::TableRank::Datums,
                    members: #table_fn,
                };
        }
    };

    let alias_slice = quote!(&[#(#alias_literals),*]);

    Ok(quote! {
        #item

        impl ::farcall::registry::Container for #ident {
            fn container_name(&self) -> &'static str {
                #container_name
            }

            fn alias_paths(&self) -> &'static [&'static str] {
                #alias_slice
            }
        }

        #table
    })
}
