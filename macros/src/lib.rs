//! Procedural macros for on-device TAP tests in ble-hid-bridge.
//!
//! `#[tap_test]` registers a function with the collector in
//! `ble_hid_bridge::testing` so the `device-tests` binary can run it on the
//! ESP32 (or on the host) and report results in TAP format.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Expr, ExprLit, ItemFn, Lit, Meta, ReturnType};

/// Mark a function as a TAP test.
///
/// Supported forms:
///
/// - `#[tap_test]`
/// - `#[tap_test(should_panic)]`
/// - `#[tap_test(should_panic = "expected message")]`
///
/// The function may return `()` (a panic means failure) or a `Result`
/// whose `Err` means failure.
///
/// ```ignore
/// use ble_hid_bridge_macros::tap_test;
///
/// #[tap_test]
/// fn nvs_round_trip() -> ble_hid_bridge::testing::TestResult {
///     let store = NvsStore::open_default()?;
///     store.set_u32("device", "baud", 9600)?;
///     assert_eq!(store.get_u32("device", "baud")?, Some(9600));
///     Ok(())
/// }
/// ```
#[proc_macro_attribute]
pub fn tap_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input_fn = parse_macro_input!(item as ItemFn);

    let name = &input_fn.sig.ident;
    let name_str = name.to_string();
    let block = &input_fn.block;
    let vis = &input_fn.vis;
    let attrs = &input_fn.attrs;
    let output = &input_fn.sig.output;

    let expectation = match parse_expectation(attr) {
        Ok(expectation) => expectation,
        Err(message) => {
            return syn::Error::new(proc_macro2::Span::call_site(), message)
                .to_compile_error()
                .into()
        }
    };

    let returns_result = matches!(output, ReturnType::Type(_, _));

    let invoke = match expectation {
        Expectation::Pass if returns_result => quote! {
            runner.run(#name_str, #name);
        },
        Expectation::Pass => quote! {
            runner.run_assert(#name_str, #name);
        },
        Expectation::Panic(None) => quote! {
            runner.run_should_panic(#name_str, #name, None);
        },
        Expectation::Panic(Some(msg)) => quote! {
            runner.run_should_panic(#name_str, #name, Some(#msg));
        },
    };

    let expanded = quote! {
        #(#attrs)*
        #vis fn #name() #output #block

        ::inventory::submit! {
            ::ble_hid_bridge::testing::TapTestEntry::new(
                #name_str,
                |runner: &mut ::ble_hid_bridge::testing::TestRunner| {
                    #invoke
                }
            )
        }
    };

    TokenStream::from(expanded)
}

enum Expectation {
    Pass,
    Panic(Option<String>),
}

fn parse_expectation(attr: TokenStream) -> Result<Expectation, String> {
    if attr.is_empty() {
        return Ok(Expectation::Pass);
    }

    let meta: Meta = syn::parse(attr).map_err(|e| format!("tap_test: {}", e))?;
    match meta {
        Meta::Path(path) if path.is_ident("should_panic") => Ok(Expectation::Panic(None)),
        Meta::NameValue(nv) if nv.path.is_ident("should_panic") => match nv.value {
            Expr::Lit(ExprLit {
                lit: Lit::Str(s), ..
            }) => Ok(Expectation::Panic(Some(s.value()))),
            _ => Err("tap_test: should_panic expects a string literal".to_string()),
        },
        _ => Err(
            "tap_test: supported attributes are `should_panic` and `should_panic = \"msg\"`"
                .to_string(),
        ),
    }
}
