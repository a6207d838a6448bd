//! Procedural macros for bindery

use darling::{FromDeriveInput, FromField};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

/// Container-level options for #[derive(Inspect)]
#[derive(Debug, FromDeriveInput)]
#[darling(attributes(inspect), supports(struct_named))]
struct InspectOpts {
    ident: syn::Ident,
    generics: syn::Generics,
    data: darling::ast::Data<(), InspectField>,
}

/// Field-level attributes
#[derive(Debug, FromField)]
#[darling(attributes(inspect))]
struct InspectField {
    ident: Option<syn::Ident>,
    ty: syn::Type,

    /// Leave the field out of the accessor table
    #[darling(default)]
    skip: bool,

    /// Expose the field under another name
    #[darling(default)]
    rename: Option<String>,

    /// The field is itself `Inspect` (optionally wrapped in `Option`)
    #[darling(default)]
    nested: bool,
}

/// Inner type of `Option<T>`, matched syntactically
fn option_inner(ty: &syn::Type) -> Option<&syn::Type> {
    let syn::Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }
    let syn::PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        syn::GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

/// Derive macro for the Inspect trait
///
/// Builds the property table once and generates by-name readers. Scalar
/// fields must implement `PropertyValue`; fields marked `nested` must
/// implement `Inspect` themselves (directly or inside an `Option`).
///
/// # Example
/// ```ignore
/// #[derive(Inspect)]
/// struct Customer {
///     name: Option<String>,
///     #[inspect(rename = "years")]
///     age: u32,
///     #[inspect(nested)]
///     address: Option<Address>,
///     #[inspect(skip)]
///     cache: Vec<u8>,
/// }
///
/// let path = PropertyPath::resolve::<Customer>("address.city")?;
/// ```
#[proc_macro_derive(Inspect, attributes(inspect))]
pub fn derive_inspect(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let opts = match InspectOpts::from_derive_input(&input) {
        Ok(opts) => opts,
        Err(e) => return e.write_errors().into(),
    };

    if !opts.generics.params.is_empty() {
        return syn::Error::new_spanned(
            &opts.generics,
            "Inspect cannot be derived for generic structs",
        )
        .to_compile_error()
        .into();
    }

    let name = &opts.ident;
    let fields = match &opts.data {
        darling::ast::Data::Struct(fields) => fields,
        _ => {
            return syn::Error::new_spanned(&input, "Inspect can only be derived for structs")
                .to_compile_error()
                .into();
        }
    };

    let mut descriptors: Vec<TokenStream2> = Vec::new();
    let mut read_arms: Vec<TokenStream2> = Vec::new();
    let mut nested_arms: Vec<TokenStream2> = Vec::new();

    for field in fields.iter().filter(|f| !f.skip) {
        let Some(ident) = &field.ident else {
            continue;
        };
        let key = field.rename.clone().unwrap_or_else(|| ident.to_string());
        let ty = &field.ty;

        if field.nested {
            match option_inner(ty) {
                Some(inner) => {
                    descriptors.push(quote! {
                        ::bindery::inspect::PropertyDescriptor::new(
                            #key,
                            ::bindery::value::PropertyType::object::<#inner>(true),
                        )
                    });
                    nested_arms.push(quote! {
                        #key => self.#ident.as_ref().map(|v| v as &dyn ::bindery::inspect::Inspect)
                    });
                }
                None => {
                    descriptors.push(quote! {
                        ::bindery::inspect::PropertyDescriptor::new(
                            #key,
                            ::bindery::value::PropertyType::object::<#ty>(false),
                        )
                    });
                    nested_arms.push(quote! {
                        #key => ::core::option::Option::Some(&self.#ident as &dyn ::bindery::inspect::Inspect)
                    });
                }
            }
        } else {
            descriptors.push(quote! {
                ::bindery::inspect::PropertyDescriptor::new(
                    #key,
                    <#ty as ::bindery::value::PropertyValue>::property_type(),
                )
            });
            read_arms.push(quote! {
                #key => ::core::option::Option::Some(
                    ::bindery::value::PropertyValue::to_value(&self.#ident)
                )
            });
        }
    }

    let expanded = quote! {
        impl ::bindery::inspect::Inspect for #name {
            fn descriptors() -> &'static [::bindery::inspect::PropertyDescriptor] {
                static TABLE: ::std::sync::OnceLock<::std::vec::Vec<::bindery::inspect::PropertyDescriptor>> =
                    ::std::sync::OnceLock::new();
                TABLE.get_or_init(|| ::std::vec![#(#descriptors),*])
            }

            fn read(&self, property: &str) -> ::core::option::Option<::bindery::value::Value> {
                match property {
                    #(#read_arms,)*
                    _ => ::core::option::Option::None,
                }
            }

            fn nested(&self, property: &str) -> ::core::option::Option<&dyn ::bindery::inspect::Inspect> {
                match property {
                    #(#nested_arms,)*
                    _ => ::core::option::Option::None,
                }
            }
        }
    };

    TokenStream::from(expanded)
}

/// Derive macro for the PropertyEnum trait
///
/// Also implements `PropertyValue`, so the enum can be used as an
/// inspectable field. Variants are exposed by name with their discriminant.
///
/// # Example
/// ```ignore
/// #[derive(PropertyEnum, Clone, Copy)]
/// enum Status {
///     Draft,
///     Active = 10,
///     Archived,
/// }
///
/// assert_eq!(Status::Archived.discriminant(), 11);
/// assert_eq!(Status::variants()[1].name, "Active");
/// ```
#[proc_macro_derive(PropertyEnum)]
pub fn derive_property_enum(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let expanded = match &input.data {
        syn::Data::Enum(data) => {
            // Check that all variants are unit variants
            for variant in &data.variants {
                if !matches!(variant.fields, syn::Fields::Unit) {
                    return syn::Error::new_spanned(
                        variant,
                        "PropertyEnum can only be derived for enums with unit variants",
                    )
                    .to_compile_error()
                    .into();
                }
            }

            let variant_names: Vec<_> = data.variants.iter().map(|v| &v.ident).collect();
            let variant_strings: Vec<_> = variant_names.iter().map(|v| v.to_string()).collect();

            let table = variant_names
                .iter()
                .zip(variant_strings.iter())
                .map(|(v, s)| {
                    quote! { ::bindery::value::EnumVariant::new(#s, #name::#v as i64) }
                });

            let name_arms = variant_names
                .iter()
                .zip(variant_strings.iter())
                .map(|(v, s)| {
                    quote! { #name::#v => #s }
                });

            let discriminant_arms = variant_names.iter().map(|v| {
                quote! { #name::#v => #name::#v as i64 }
            });

            quote! {
                impl ::bindery::value::PropertyEnum for #name {
                    fn variants() -> &'static [::bindery::value::EnumVariant] {
                        static VARIANTS: &[::bindery::value::EnumVariant] = &[#(#table),*];
                        VARIANTS
                    }

                    fn variant_name(&self) -> &'static str {
                        match self {
                            #(#name_arms),*
                        }
                    }

                    fn discriminant(&self) -> i64 {
                        match self {
                            #(#discriminant_arms),*
                        }
                    }
                }

                impl ::bindery::value::PropertyValue for #name {
                    fn property_type() -> ::bindery::value::PropertyType {
                        ::bindery::value::PropertyType::new(::bindery::value::ValueKind::Enum(
                            <#name as ::bindery::value::PropertyEnum>::variants,
                        ))
                    }

                    fn to_value(&self) -> ::bindery::value::Value {
                        ::bindery::value::PropertyEnum::to_enum_value(self)
                    }
                }
            }
        }
        _ => {
            return syn::Error::new_spanned(input, "PropertyEnum can only be derived for enums")
                .to_compile_error()
                .into();
        }
    };

    TokenStream::from(expanded)
}
