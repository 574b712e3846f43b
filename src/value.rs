//! Interpolated values and how they turn into output chunks.
//!
//! A value is either primitive (rendered via its string form, nothing
//! for `Empty`), a future (awaited, its result is rendered by the same
//! rule) or a sequence (each element rendered by the same rule, in
//! order).

use std::fmt;

use anyhow::Result;
use futures::{future::{self, LocalBoxFuture},
              stream::{self, LocalBoxStream},
              Future, FutureExt, Stream, StreamExt};
use kstring::KString;

/// The lazily produced output of a render: pull-based, single
/// consumption, and an `Err` item ends the useful output.
pub type Chunks = LocalBoxStream<'static, Result<KString>>;

pub enum Value {
    Empty,
    Text(KString),
    List(Vec<Value>),
    Future(LocalBoxFuture<'static, Result<Value>>),
    Stream(LocalBoxStream<'static, Result<Value>>),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => f.write_str("Empty"),
            Value::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Value::List(vs) => f.debug_tuple("List").field(vs).finish(),
            Value::Future(_) => f.write_str("Future(..)"),
            Value::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

pub(crate) fn error_chunk(e: anyhow::Error) -> Chunks {
    stream::once(future::ready(Err(e))).boxed_local()
}

impl Value {
    pub fn future<F, V>(f: F) -> Value
    where F: Future<Output = Result<V>> + 'static,
          V: Into<Value>
    {
        Value::Future(f.map(|r| r.map(Into::into)).boxed_local())
    }

    /// An already settled future.
    pub fn ready(v: impl Into<Value>) -> Value {
        Value::Future(future::ready(Ok(v.into())).boxed_local())
    }

    /// A future that fails with `e` when awaited.
    pub fn rejected(e: anyhow::Error) -> Value {
        Value::Future(future::ready(Err(e)).boxed_local())
    }

    pub fn stream<S, V>(s: S) -> Value
    where S: Stream<Item = Result<V>> + 'static,
          V: Into<Value>
    {
        Value::Stream(s.map(|r| r.map(Into::into)).boxed_local())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Value::Empty => true,
            Value::Text(s) => s.is_empty(),
            _ => false
        }
    }

    pub fn into_chunks(self) -> Chunks {
        match self {
            Value::Empty => stream::empty().boxed_local(),
            Value::Text(s) => {
                if s.is_empty() {
                    stream::empty().boxed_local()
                } else {
                    stream::once(future::ready(Ok(s))).boxed_local()
                }
            }
            Value::List(vs) => stream::iter(vs).flat_map(Value::into_chunks).boxed_local(),
            Value::Future(f) => f.map(|r| match r {
                Ok(v) => v.into_chunks(),
                Err(e) => error_chunk(e),
            }).flatten_stream().boxed_local(),
            Value::Stream(s) => s.flat_map(|r| match r {
                Ok(v) => v.into_chunks(),
                Err(e) => error_chunk(e),
            }).boxed_local(),
        }
    }

    /// The complete string form, awaiting everything inside.
    pub async fn resolve(self) -> Result<KString> {
        collect_chunks(self.into_chunks()).await
    }
}

/// Concatenates all chunks, failing on the first error.
pub async fn collect_chunks(mut chunks: Chunks) -> Result<KString> {
    let mut out = String::new();
    while let Some(chunk) = chunks.next().await {
        out.push_str(&chunk?);
    }
    Ok(KString::from_string(out))
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(KString::from_ref(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(KString::from_string(s))
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Text(KString::from_ref(s))
    }
}

impl From<KString> for Value {
    fn from(s: KString) -> Self {
        Value::Text(s)
    }
}

macro_rules! value_from_display {
    ($($t:ty)*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::Text(KString::from_string(v.to_string()))
                }
            }
        )*
    }
}

value_from_display!(i8 i16 i32 i64 i128 isize u8 u16 u32 u64 u128 usize f32 f64 bool char);

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Empty
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Empty
        }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(vs: Vec<T>) -> Self {
        Value::List(vs.into_iter().map(Into::into).collect())
    }
}

impl From<Chunks> for Value {
    fn from(chunks: Chunks) -> Self {
        Value::Stream(chunks.map(|r| r.map(Value::Text)).boxed_local())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use futures::executor::block_on;

    fn chunks_of(v: Value) -> Result<Vec<String>> {
        block_on(v.into_chunks().map(|r| r.map(|s| s.to_string()))
                 .collect::<Vec<_>>())
            .into_iter().collect()
    }

    #[test]
    fn t_primitives() -> Result<()> {
        assert_eq!(chunks_of(22.into())?, vec!["22"]);
        assert_eq!(chunks_of(1.5f64.into())?, vec!["1.5"]);
        assert_eq!(chunks_of(true.into())?, vec!["true"]);
        assert_eq!(chunks_of(().into())?, Vec::<String>::new());
        assert_eq!(chunks_of(None::<&str>.into())?, Vec::<String>::new());
        assert_eq!(chunks_of("".into())?, Vec::<String>::new());
        Ok(())
    }

    #[test]
    fn t_nested_sequences_keep_order() -> Result<()> {
        let late = Value::future(async {
            Ok::<_, anyhow::Error>(vec!["b1", "b2"])
        });
        let s = Value::stream(stream::iter(vec![
            Ok::<_, anyhow::Error>(Value::from("c1")),
            Ok(Value::ready(vec![Value::from("c2"), Value::Empty, Value::from(3)])),
        ]));
        let v = Value::List(vec!["a".into(), late, s]);
        assert_eq!(chunks_of(v)?, vec!["a", "b1", "b2", "c1", "c2", "3"]);
        Ok(())
    }

    #[test]
    fn t_rejection_surfaces_as_item() {
        let v = Value::List(vec!["ok".into(), Value::rejected(anyhow!("nope"))]);
        let items = block_on(v.into_chunks().collect::<Vec<_>>());
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().map(|s| s.as_str()).ok(), Some("ok"));
        assert_eq!(items[1].as_ref().map_err(|e| e.to_string()).err().as_deref(),
                   Some("nope"));
        assert!(block_on(Value::rejected(anyhow!("x")).resolve()).is_err());
    }

    #[test]
    fn t_resolve() -> Result<()> {
        let v = Value::ready(vec![Value::from("x"), Value::ready(1u8)]);
        assert_eq!(block_on(v.resolve())?.as_str(), "x1");
        Ok(())
    }
}
