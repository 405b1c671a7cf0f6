//! `#[test_timeout::timeout]` wraps a test in a watchdog thread so a hung
//! test fails with a clear message instead of stalling the whole suite.
//! Works on both sync and async functions; async bodies run on a fresh
//! current-thread Tokio runtime. An optional integer argument overrides the
//! default limit in seconds: `#[test_timeout::timeout(120)]`.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, ItemFn, LitInt};

const DEFAULT_LIMIT_SECS: u64 = 60;

#[proc_macro_attribute]
pub fn timeout(attr: TokenStream, item: TokenStream) -> TokenStream {
    let limit_secs = if attr.is_empty() {
        DEFAULT_LIMIT_SECS
    } else {
        let lit = parse_macro_input!(attr as LitInt);
        match lit.base10_parse::<u64>() {
            Ok(0) | Err(_) => {
                return syn::Error::new_spanned(lit, "timeout must be a positive number of seconds")
                    .to_compile_error()
                    .into();
            }
            Ok(secs) => secs,
        }
    };

    let ItemFn {
        attrs,
        vis,
        mut sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    // The attribute supplies #[test] itself; an async signature only means
    // the body needs a runtime, the generated test is synchronous.
    let body = if sig.asyncness.take().is_some() {
        quote! {{
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to build tokio runtime for test");
            runtime.block_on(async #block)
        }}
    } else {
        quote! { #block }
    };

    TokenStream::from(quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            let limit = std::time::Duration::from_secs(#limit_secs);
            let (done_tx, done_rx) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| #body));
                let _ = done_tx.send(outcome);
            });
            match done_rx.recv_timeout(limit) {
                Ok(Ok(_)) => {}
                Ok(Err(panic)) => std::panic::resume_unwind(panic),
                Err(_) => panic!("test exceeded its {}s timeout", limit.as_secs()),
            }
        }
    })
}
