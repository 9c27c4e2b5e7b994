//! Attribute parsing and type classification shared by both macros.

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::punctuated::Punctuated;
use syn::{Attribute, Expr, ExprLit, GenericArgument, Lit, Meta, PathArguments, Token, Type};

/// Credential family requested by `secured`.
#[derive(Clone, Copy)]
pub enum Family {
    Token,
    Key,
    Either,
}

impl Family {
    pub fn tokens(self) -> TokenStream {
        match self {
            Family::Token => quote!(::farcall::member::CredentialFamily::TokenOnly),
            Family::Key => quote!(::farcall::member::CredentialFamily::KeyOnly),
            Family::Either => quote!(::farcall::member::CredentialFamily::Either),
        }
    }
}

/// Parsed `#[expose(...)]` arguments.
#[derive(Default)]
pub struct ExposeArgs {
    pub name: Option<String>,
    pub description: String,
    pub secured: Option<Family>,
    pub immutable: bool,
    pub stream: bool,
}

/// Find and parse the `#[expose]` marker on an item. Returns `None` when
/// the item is not exposed.
pub fn parse_expose(attrs: &[Attribute]) -> syn::Result<Option<ExposeArgs>> {
    let Some(attr) = attrs.iter().find(|a| a.path().is_ident("expose")) else {
        return Ok(None);
    };

    let mut args = ExposeArgs::default();
    match &attr.meta {
        Meta::Path(_) => {}
        Meta::List(_) => {
            let metas = attr.parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated)?;
            for meta in metas {
                match &meta {
                    Meta::Path(path) if path.is_ident("immutable") => args.immutable = true,
                    Meta::Path(path) if path.is_ident("stream") => args.stream = true,
                    Meta::Path(path) if path.is_ident("secured") => {
                        args.secured = Some(Family::Either)
                    }
                    Meta::NameValue(nv) if nv.path.is_ident("name") => {
                        args.name = Some(string_value(&nv.value)?)
                    }
                    Meta::NameValue(nv) if nv.path.is_ident("description") => {
                        args.description = string_value(&nv.value)?
                    }
                    Meta::NameValue(nv) if nv.path.is_ident("secured") => {
                        args.secured = Some(match string_value(&nv.value)?.as_str() {
                            "token" => Family::Token,
                            "key" => Family::Key,
                            "either" => Family::Either,
                            other => {
                                return Err(syn::Error::new_spanned(
                                    &nv.value,
                                    format!(
                                        "unknown credential family '{other}' \
                                         (expected \"token\", \"key\", or \"either\")"
                                    ),
                                ))
                            }
                        })
                    }
                    other => {
                        return Err(syn::Error::new_spanned(
                            other,
                            "unsupported expose argument (expected name, description, \
                             secured, immutable, or stream)",
                        ))
                    }
                }
            }
        }
        Meta::NameValue(_) => {
            return Err(syn::Error::new_spanned(
                attr,
                "expected #[expose] or #[expose(...)]",
            ))
        }
    }
    Ok(Some(args))
}

/// Remove the inert `#[expose]` markers before re-emitting the item.
pub fn strip_expose(attrs: &mut Vec<Attribute>) {
    attrs.retain(|a| !a.path().is_ident("expose"));
}

fn string_value(expr: &Expr) -> syn::Result<String> {
    if let Expr::Lit(ExprLit { lit: Lit::Str(s), .. }) = expr {
        Ok(s.value())
    } else {
        Err(syn::Error::new_spanned(expr, "expected a string literal"))
    }
}

/// The wire-value shape a declared type accepts.
#[derive(Clone, Copy)]
pub enum Shape {
    Str,
    Num,
    Bool,
    Obj,
    List,
    Any,
}

impl Shape {
    pub fn tokens(self) -> TokenStream {
        let variant = match self {
            Shape::Str => "Str",
            Shape::Num => "Num",
            Shape::Bool => "Bool",
            Shape::Obj => "Obj",
            Shape::List => "List",
            Shape::Any => "Any",
        };
        let ident = format_ident!("{variant}");
        quote!(::farcall::member::ValueShape::#ident)
    }
}

/// Classified parameter type.
pub struct TypeClass {
    pub short: String,
    pub shape: Shape,
    pub nullable: bool,
}

/// Classify a parameter type: short name, wire shape, nullability.
pub fn classify_param(ty: &Type) -> syn::Result<TypeClass> {
    match ty {
        Type::Reference(_) => Err(syn::Error::new_spanned(
            ty,
            "exposed member parameters must be owned types",
        )),
        Type::Paren(inner) => classify_param(&inner.elem),
        Type::Array(_) => Ok(TypeClass { short: "array".to_owned(), shape: Shape::List, nullable: false }),
        Type::Tuple(tuple) if !tuple.elems.is_empty() => {
            Ok(TypeClass { short: "tuple".to_owned(), shape: Shape::List, nullable: false })
        }
        Type::Path(path) => {
            let segment = path
                .path
                .segments
                .last()
                .ok_or_else(|| syn::Error::new_spanned(ty, "unsupported parameter type"))?;
            let ident = segment.ident.to_string();
            if ident == "Option" {
                let inner = first_generic_arg(&segment.arguments).ok_or_else(|| {
                    syn::Error::new_spanned(ty, "Option parameter needs a type argument")
                })?;
                let inner_class = classify_param(inner)?;
                Ok(TypeClass { nullable: true, ..inner_class })
            } else {
                Ok(TypeClass { shape: shape_of(&ident), short: ident, nullable: false })
            }
        }
        other => Err(syn::Error::new_spanned(other, "unsupported parameter type")),
    }
}

fn shape_of(ident: &str) -> Shape {
    match ident {
        "String" | "str" | "char" => Shape::Str,
        "i8" | "i16" | "i32" | "i64" | "i128" | "u8" | "u16" | "u32" | "u64" | "u128"
        | "isize" | "usize" | "f32" | "f64" => Shape::Num,
        "bool" => Shape::Bool,
        "Vec" | "VecDeque" | "HashSet" | "BTreeSet" | "LinkedList" | "BinaryHeap" => Shape::List,
        // serde_json::Value parameters accept any wire value.
        "Value" => Shape::Any,
        _ => Shape::Obj,
    }
}

/// Short display name of a type, as used in keys and introspection.
pub fn short_type_name(ty: &Type) -> String {
    match ty {
        Type::Reference(reference) => short_type_name(&reference.elem),
        Type::Paren(inner) => short_type_name(&inner.elem),
        Type::Tuple(tuple) if tuple.elems.is_empty() => "void".to_owned(),
        Type::Tuple(_) => "tuple".to_owned(),
        Type::Array(_) | Type::Slice(_) => "array".to_owned(),
        Type::Path(path) => path
            .path
            .segments
            .last()
            .map(|segment| segment.ident.to_string())
            .unwrap_or_else(|| "value".to_owned()),
        Type::ImplTrait(_) => "impl".to_owned(),
        _ => "value".to_owned(),
    }
}

/// First type argument of a generic segment, e.g. `T` out of `Option<T>`.
pub fn first_generic_arg(arguments: &PathArguments) -> Option<&Type> {
    if let PathArguments::AngleBracketed(args) = arguments {
        for arg in &args.args {
            if let GenericArgument::Type(ty) = arg {
                return Some(ty);
            }
        }
    }
    None
}

/// Whether a type's last path segment matches `name`.
pub fn last_segment_is(ty: &Type, name: &str) -> bool {
    if let Type::Path(path) = ty {
        path.path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == name)
    } else {
        false
    }
}

/// Render a path as its source string, e.g. `api::Greeting`.
pub fn path_to_string(path: &syn::Path) -> String {
    quote!(#path).to_string().replace(' ', "")
}
