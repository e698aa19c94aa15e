#![allow(non_snake_case)]

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote, ToTokens};
use syn::{parse_macro_input, spanned::Spanned, Data, DeriveInput, Expr, Fields, Lit, Meta, Type};

/// Inject the owning `ash::Device` into a Vulkan backend object.
///
/// Only usable inside `lumen-rhi`: the generated impls name `crate::vulkan::device`.
#[proc_macro_attribute]
#[allow(non_snake_case)]
pub fn DeviceObject(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as syn::ItemStruct);
    let ident = input.ident.clone();
    let generics = input.generics.clone();
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let mut output_struct = input.clone();

    let syn::Fields::Named(fields_named) = &mut output_struct.fields else {
        return syn::Error::new(
            output_struct.span(),
            "DeviceObject only supports structs with named fields",
        )
        .to_compile_error()
        .into();
    };

    if fields_named.named.iter().any(|f| f.ident.as_ref().is_some_and(|id| id == "device")) {
        return syn::Error::new(
            fields_named.span(),
            "DeviceObject: struct already has a `device` field; the macro injects `pub(crate) device: ash::Device`",
        )
        .to_compile_error()
        .into();
    }

    let device_field: syn::Field = syn::parse_quote! {
        pub(crate) device: ::ash::Device
    };
    fields_named.named.push(device_field);

    let expanded = quote! {
        #output_struct

        impl #impl_generics crate::vulkan::device::sealed::Sealed for #ident #ty_generics #where_clause {}

        impl #impl_generics crate::vulkan::device::DeviceObject for #ident #ty_generics #where_clause {
            #[inline]
            fn device(&self) -> &::ash::Device { &self.device }
        }
    };

    expanded.into()
}

/// Describe an interleaved `#[repr(C)]` vertex struct as a backend-neutral vertex layout.
///
/// Fields map to consecutive shader locations starting at zero. Supported field types are
/// `f32`, `u32`, `i32`, arrays `[f32; N]` / `[u32; N]` with `N` in 2..=4, and the glam vectors
/// `Vec2`, `Vec3`, `Vec4`, `UVec2`, `UVec3` and `UVec4`.
#[proc_macro_derive(VertexLayout)]
pub fn derive_vertex_layout(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match vertex_layout_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn vertex_layout_impl(input: &DeriveInput) -> syn::Result<TokenStream2> {
    if !is_repr_c(&input.attrs) {
        return Err(syn::Error::new(
            input.ident.span(),
            "VertexLayout needs #[repr(C)] so field offsets are stable",
        ));
    }
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new(input.ident.span(), "VertexLayout can only be derived for structs"));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new(data.fields.span(), "VertexLayout needs named fields"));
    };

    let attributes = fields
        .named
        .iter()
        .enumerate()
        .map(|(location, field)| {
            let Some(name) = field.ident.as_ref() else {
                return Err(syn::Error::new(field.span(), "expected a named field"));
            };
            let format = format_ident!("{}", vertex_format(&field.ty)?);
            let location = location as u32;
            Ok(quote! {
                ::lumen_rhi::VertexAttribute {
                    location: #location,
                    format: ::lumen_rhi::VertexFormat::#format,
                    offset: ::lumen_rhi::memoffset::offset_of!(Self, #name) as u32,
                }
            })
        })
        .collect::<syn::Result<Vec<_>>>()?;

    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    Ok(quote! {
        impl #impl_generics ::lumen_rhi::VertexLayout for #ident #ty_generics #where_clause {
            fn stride() -> u32 {
                ::core::mem::size_of::<Self>() as u32
            }

            fn attributes() -> ::std::vec::Vec<::lumen_rhi::VertexAttribute> {
                ::std::vec![#(#attributes),*]
            }
        }
    })
}

fn is_repr_c(attrs: &[syn::Attribute]) -> bool {
    attrs
        .iter()
        .filter(|attr| attr.path().is_ident("repr"))
        .filter_map(|attr| {
            attr.parse_args_with(syn::punctuated::Punctuated::<Meta, syn::Token![,]>::parse_terminated)
                .ok()
        })
        .flatten()
        .any(|meta| meta.path().is_ident("C"))
}

/// Name of the `VertexFormat` variant matching `ty`.
fn vertex_format(ty: &Type) -> syn::Result<&'static str> {
    let (scalar, len) = field_shape(ty)
        .ok_or_else(|| syn::Error::new(ty.span(), format!("unsupported vertex field type `{}`", ty.to_token_stream())))?;

    let format = match (scalar.as_str(), len) {
        ("f32", 1) => "Float32",
        ("f32", 2) => "Float32x2",
        ("f32", 3) => "Float32x3",
        ("f32", 4) => "Float32x4",
        ("u32", 1) => "Uint32",
        ("u32", 2) => "Uint32x2",
        ("u32", 3) => "Uint32x3",
        ("u32", 4) => "Uint32x4",
        ("i32", 1) => "Sint32",
        _ => {
            return Err(syn::Error::new(
                ty.span(),
                format!("no vertex format for {len} x `{scalar}`"),
            ))
        }
    };
    Ok(format)
}

/// Scalar type name and component count of a field type.
fn field_shape(ty: &Type) -> Option<(String, usize)> {
    match ty {
        Type::Array(array) => {
            let Expr::Lit(expr) = &array.len else { return None };
            let Lit::Int(len) = &expr.lit else { return None };
            let (scalar, 1) = field_shape(&array.elem)? else { return None };
            Some((scalar, len.base10_parse().ok()?))
        }
        Type::Path(path) => {
            let name = path.path.segments.last()?.ident.to_string();
            let shape = match name.as_str() {
                "f32" | "u32" | "i32" => (name.clone(), 1),
                "Vec2" => ("f32".to_owned(), 2),
                "Vec3" => ("f32".to_owned(), 3),
                "Vec4" => ("f32".to_owned(), 4),
                "UVec2" => ("u32".to_owned(), 2),
                "UVec3" => ("u32".to_owned(), 3),
                "UVec4" => ("u32".to_owned(), 4),
                _ => return None,
            };
            Some(shape)
        }
        _ => None,
    }
}
