//! `#[traced]` attribute used across the courier crates.
//!
//! The attribute emits a `TRACE` event when the function is entered and
//! another when it returns (including early returns and `?` exits, since
//! the exit event is emitted from a drop guard). Optionally it records
//! the elapsed time and wraps the function in a `tracing::instrument`
//! span.
//!
//! ```ignore
//! #[traced(instrument(level = tracing::Level::DEBUG, skip(self)), timing(precision = "ms"))]
//! async fn send(&self, message: &Message) -> Result<(), TransportError> { ... }
//! ```
#![warn(clippy::pedantic)]

extern crate proc_macro;

use proc_macro2::TokenStream;
use quote::{quote, quote_spanned};
use syn::{ItemFn, Stmt, parse::Parse, parse_macro_input, parse_quote};

#[derive(PartialEq, Eq, Clone, Copy, Default)]
enum Precision {
    #[default]
    Nanos,
    Micros,
    Millis,
    Seconds,
}

impl Precision {
    fn parse_unit(unit: &str) -> Option<Self> {
        match unit {
            "ns" | "nano" | "nanos" | "nanoseconds" => Some(Self::Nanos),
            "us" | "micro" | "micros" | "microseconds" => Some(Self::Micros),
            "ms" | "milli" | "millis" | "milliseconds" => Some(Self::Millis),
            "s" | "sec" | "secs" | "seconds" => Some(Self::Seconds),
            _ => None,
        }
    }

    /// Expression rendering `__elapsed` (a `Duration`) in this unit.
    fn render(self) -> syn::Expr {
        match self {
            Self::Nanos => parse_quote!(format!("{}ns", __elapsed.as_nanos())),
            Self::Micros => parse_quote!(format!("{}us", __elapsed.as_micros())),
            Self::Millis => parse_quote!(format!("{}ms", __elapsed.as_millis())),
            Self::Seconds => parse_quote!(format!("{}s", __elapsed.as_secs())),
        }
    }
}

impl Parse for Precision {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        if !input.peek(syn::token::Paren) {
            return Ok(Self::default());
        }

        let content;
        let _ = syn::parenthesized!(content in input);
        let _ = content.parse::<keywords::precision>()?;
        let _ = content.parse::<syn::Token![=]>()?;
        let unit = content.parse::<syn::LitStr>()?;

        Self::parse_unit(&unit.value()).ok_or_else(|| {
            syn::Error::new(
                unit.span(),
                "unknown precision, expected one of `ns`, `us`, `ms` or `s`",
            )
        })
    }
}

mod keywords {
    syn::custom_keyword!(timing);
    syn::custom_keyword!(precision);
    syn::custom_keyword!(instrument);
}

#[derive(Default)]
struct Attributes {
    timing: Option<Precision>,
    instrument: Option<TokenStream>,
    unrecognised: Vec<syn::Error>,
}

impl Attributes {
    /// Unknown tokens are reported as deprecation warnings rather than hard
    /// errors, so a typo in the attribute never breaks a build.
    fn warnings(&self) -> TokenStream {
        let warnings = self.unrecognised.iter().map(|err| {
            let msg = syn::LitStr::new(&format!("`traced` ignored input: {err}"), err.span());

            quote_spanned! {err.span()=>
                #[warn(deprecated)]
                {
                    #[deprecated(since = "0.0.0", note = #msg)]
                    const TRACED_IGNORED_INPUT: () = ();
                    let () = TRACED_IGNORED_INPUT;
                }
            }
        });

        quote! { #(#warnings)* }
    }
}

impl Parse for Attributes {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let mut attributes = Self::default();

        while !input.is_empty() {
            let lookahead = input.lookahead1();
            if lookahead.peek(keywords::timing) {
                if attributes.timing.is_some() {
                    return Err(input.error("`timing` may only be given once"));
                }

                let _ = input.parse::<keywords::timing>()?;
                attributes.timing = Some(input.parse()?);
            } else if lookahead.peek(keywords::instrument) {
                if attributes.instrument.is_some() {
                    return Err(input.error("`instrument` may only be given once"));
                }

                let _ = input.parse::<keywords::instrument>()?;
                attributes.instrument = if input.peek(syn::token::Paren) {
                    let content;
                    let _ = syn::parenthesized!(content in input);
                    Some(content.parse()?)
                } else {
                    Some(TokenStream::new())
                };
            } else if lookahead.peek(syn::Token![,]) {
                let _ = input.parse::<syn::Token![,]>()?;
            } else {
                attributes.unrecognised.push(lookahead.error());
                let _ = input.parse::<proc_macro2::TokenTree>()?;
            }
        }

        Ok(attributes)
    }
}

/// Emits `tracing::trace!` events on entry to and exit from the attributed
/// function.
///
/// Arguments:
/// - `instrument(...)`: forwarded verbatim to `#[tracing::instrument]`
/// - `timing` / `timing(precision = "ms")`: records the elapsed time on exit
#[proc_macro_attribute]
pub fn traced(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    let args = parse_macro_input!(args as Attributes);
    let mut item_fn = parse_macro_input!(item as ItemFn);

    item_fn
        .attrs
        .push(parse_quote! { #[allow(clippy::items_after_statements)] });

    if let Some(fields) = &args.instrument {
        item_fn
            .attrs
            .push(parse_quote! { #[tracing::instrument(#fields)] });
    }

    let function = item_fn.sig.ident.to_string();
    let warnings = args.warnings();

    let on_exit: Stmt = match args.timing {
        Some(precision) => {
            let elapsed = precision.render();
            parse_quote! {
                {
                    let __elapsed = self.started.elapsed();
                    tracing::trace!(function = #function, elapsed = %#elapsed, "exit");
                }
            }
        }
        None => parse_quote! {
            {
                let _ = self.started;
                tracing::trace!(function = #function, "exit");
            }
        },
    };

    let guard: Vec<Stmt> = parse_quote! {
        struct __TracedGuard {
            started: std::time::Instant,
        }

        impl __TracedGuard {
            fn enter() -> Self {
                #warnings

                tracing::trace!(function = #function, "enter");
                Self {
                    started: std::time::Instant::now(),
                }
            }
        }

        impl std::ops::Drop for __TracedGuard {
            fn drop(&mut self) {
                #on_exit
            }
        }

        let __traced_guard = __TracedGuard::enter();
    };

    let body = std::mem::take(&mut item_fn.block.stmts);
    item_fn.block.stmts = guard.into_iter().chain(body).collect();

    proc_macro::TokenStream::from(quote! { #item_fn })
}
