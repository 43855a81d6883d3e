//! Derive macros for the waitlist reducer architecture
//!
//! `#[derive(Action)]` classifies the variants of an action enum into commands
//! (intent, validated by the reducer) and events (facts, persisted and
//! replayed), and names each event for storage.
//!
//! # Example
//!
//! ```ignore
//! use waitlist_macros::Action;
//!
//! #[derive(Action, Clone, Debug)]
//! enum EventAction {
//!     #[command]
//!     JoinWaitlist { user: String },
//!
//!     #[event]
//!     EntrantJoined { user: String },
//!
//!     #[event(version = 2)]
//!     EntrantsDrawn { selected: Vec<String> },
//! }
//!
//! assert!(EventAction::JoinWaitlist { user: "u1".into() }.is_command());
//! assert_eq!(EventAction::EntrantJoined { user: "u1".into() }.event_type(), "EntrantJoined.v1");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, LitInt, Variant, parse_macro_input};

/// Derive macro for Action enums
///
/// Generates:
/// - `is_command()` - true for variants marked `#[command]`
/// - `is_event()` - true for variants marked `#[event]`
/// - `event_type()` - `"<Variant>.v<N>"` for events, `"unknown"` otherwise
///
/// # Attributes
///
/// - `#[command]` - Mark a variant as a command
/// - `#[event]` / `#[event(version = N)]` - Mark a variant as an event
///   (schema version defaults to 1)
///
/// Compile errors are produced when applied to a non-enum, when a variant
/// carries both attributes, or when `version` is not a positive integer.
#[proc_macro_derive(Action, attributes(command, event))]
pub fn derive_action(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_action(&input) {
        Ok(tokens) => tokens.into(),
        Err(error) => error.to_compile_error().into(),
    }
}

fn expand_action(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;

    let Data::Enum(data_enum) = &input.data else {
        return Err(syn::Error::new_spanned(
            input,
            "#[derive(Action)] can only be used on enums",
        ));
    };

    let mut is_command_arms = Vec::new();
    let mut is_event_arms = Vec::new();
    let mut event_type_arms = Vec::new();

    for variant in &data_enum.variants {
        let command = find_attribute(&variant.attrs, "command");
        let event = find_attribute(&variant.attrs, "event");

        match (command, event) {
            (Some(_), Some(_)) => {
                return Err(syn::Error::new_spanned(
                    variant,
                    "Variant cannot be both #[command] and #[event]",
                ));
            },
            (Some(_), None) => {
                let pattern = variant_pattern(variant);
                is_command_arms.push(quote! { #pattern => true, });
            },
            (None, Some(attr)) => {
                let version = event_version(attr)?;
                let type_name = format!("{}.v{version}", variant.ident);
                let pattern = variant_pattern(variant);
                is_event_arms.push(quote! { #pattern => true, });
                event_type_arms.push(quote! { #pattern => #type_name, });
            },
            (None, None) => {},
        }
    }

    Ok(quote! {
        impl #name {
            /// Returns true if this action is a command
            #[must_use]
            pub const fn is_command(&self) -> bool {
                match self {
                    #(#is_command_arms)*
                    _ => false,
                }
            }

            /// Returns true if this action is an event
            #[must_use]
            pub const fn is_event(&self) -> bool {
                match self {
                    #(#is_event_arms)*
                    _ => false,
                }
            }

            /// Returns the versioned event type name used for storage
            ///
            /// Only events have type names. Commands return "unknown".
            #[must_use]
            pub const fn event_type(&self) -> &'static str {
                match self {
                    #(#event_type_arms)*
                    _ => "unknown",
                }
            }
        }
    })
}

/// Match pattern for a variant regardless of its field shape.
fn variant_pattern(variant: &Variant) -> TokenStream2 {
    let ident = &variant.ident;
    match &variant.fields {
        Fields::Named(_) => quote! { Self::#ident { .. } },
        Fields::Unnamed(_) => quote! { Self::#ident(..) },
        Fields::Unit => quote! { Self::#ident },
    }
}

/// Reads `version = N` from `#[event(...)]`, defaulting to 1.
fn event_version(attr: &Attribute) -> syn::Result<u32> {
    let mut version = 1;

    if matches!(attr.meta, syn::Meta::Path(_)) {
        return Ok(version);
    }

    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("version") {
            let lit: LitInt = meta.value()?.parse()?;
            let parsed: u32 = lit.base10_parse()?;
            if parsed == 0 {
                return Err(meta.error("event version must be at least 1"));
            }
            version = parsed;
            Ok(())
        } else {
            Err(meta.error("unsupported #[event] argument, expected `version = N`"))
        }
    })?;

    Ok(version)
}

fn find_attribute<'a>(attrs: &'a [Attribute], name: &str) -> Option<&'a Attribute> {
    attrs.iter().find(|attr| attr.path().is_ident(name))
}
