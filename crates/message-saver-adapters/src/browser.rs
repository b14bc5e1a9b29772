//! Shared `js_sys` plumbing for the browser runtimes.

use wasm_bindgen::{JsCast, JsValue};

use message_saver_core::PortError;

pub(crate) fn window() -> Result<web_sys::Window, PortError> {
    web_sys::window().ok_or_else(|| PortError::Transport("missing window".to_owned()))
}

pub(crate) fn get_prop(target: &JsValue, key: &str) -> Result<JsValue, PortError> {
    js_sys::Reflect::get(target, &JsValue::from_str(key))
        .map_err(|e| PortError::Transport(format!("read property {key} failed: {e:?}")))
}

pub(crate) fn method(target: &JsValue, name: &str) -> Result<js_sys::Function, PortError> {
    get_prop(target, name)?
        .dyn_into::<js_sys::Function>()
        .map_err(|_| PortError::NotFound(format!("{name} is not a function")))
}

/// Calls `target.name(...args)` and awaits the result when it is a Promise.
pub(crate) async fn call_async(
    target: &JsValue,
    name: &str,
    args: &[JsValue],
) -> Result<JsValue, PortError> {
    let function = method(target, name)?;
    let js_args = args.iter().collect::<js_sys::Array>();
    let returned = function
        .apply(target, &js_args)
        .map_err(|e| PortError::Transport(format!("{name} dispatch failed: {e:?}")))?;
    match returned.dyn_into::<js_sys::Promise>() {
        Ok(promise) => wasm_bindgen_futures::JsFuture::from(promise)
            .await
            .map_err(|e| PortError::Rejected(format!("{name} rejected: {e:?}"))),
        Err(value) => Ok(value),
    }
}
