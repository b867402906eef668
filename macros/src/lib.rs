use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, spanned::Spanned, Ident, ItemFn, LitStr};

const USAGE: &str = "monitor_macro::test only accepts: #[monitor_macro::test], \
                     #[monitor_macro::test(current)], #[monitor_macro::test(threaded)], or \
                     string equivalents";

/// Marks a test function of the monitor test-suite.
///
/// Synchronous functions expand to a plain `#[test]`. Asynchronous functions
/// run on a tokio runtime: `current` (the default) uses a current-thread
/// runtime, `threaded` uses a multi-threaded one.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
  let input = parse_macro_input!(item as ItemFn);

  let is_async = input.sig.asyncness.is_some();

  let raw_args = proc_macro2::TokenStream::from(attr);
  let tokio_args = if raw_args.is_empty() {
    proc_macro2::TokenStream::new()
  } else {
    if !is_async {
      return TokenStream::from(
        syn::Error::new(
          raw_args.span(),
          "monitor_macro::test runtime args are only supported for async tests. Use \
           #[monitor_macro::test] for sync tests, or make the function async.",
        )
        .to_compile_error(),
      );
    }

    let flavor = if let Ok(ident) = syn::parse2::<Ident>(raw_args.clone()) {
      Some((ident.to_string(), ident.span()))
    } else if let Ok(lit) = syn::parse2::<LitStr>(raw_args.clone()) {
      Some((lit.value(), lit.span()))
    } else {
      None
    };

    match flavor {
      Some((name, _)) if name == "current" => quote!(flavor = "current_thread"),
      Some((name, _)) if name == "threaded" => quote!(flavor = "multi_thread", worker_threads = 2),
      Some((_, span)) => {
        return TokenStream::from(syn::Error::new(span, USAGE).to_compile_error());
      }
      None => {
        return TokenStream::from(syn::Error::new(raw_args.span(), USAGE).to_compile_error());
      }
    }
  };

  let native_attr = if is_async { quote!(tokio::test(#tokio_args)) } else { quote!(test) };

  let expanded = quote! {
      #[#native_attr]
      #input
  };

  TokenStream::from(expanded)
}
