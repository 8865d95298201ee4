//! Registration of callables into the dotted namespace tree
//!
//! The tree is built before serving starts and handed to the server inside an
//! `Arc`; from then on nothing can register into it.

use std::{collections::BTreeMap, fmt, future::Future, sync::Arc, time::Duration};

use futures::future::{BoxFuture, FutureExt};

use crate::{
    errors::{AppError, MethodResult},
    pool::PoolKind,
    rpc::binder::{BoundArgs, Signature},
};

/// Credential check attached to a method: `(username, password) -> accepted`.
pub type AuthCheck = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

pub type InlineFn = Arc<dyn Fn(BoundArgs) -> BoxFuture<'static, MethodResult> + Send + Sync>;
pub type BlockingFn = Arc<dyn Fn(BoundArgs) -> MethodResult + Send + Sync>;

#[derive(Clone)]
pub enum Execution {
    /// Awaited directly on the runtime.
    Inline(InlineFn),
    /// Submitted to one of the worker pools.
    Blocking { pool: PoolKind, func: BlockingFn },
}

#[derive(Clone)]
pub struct MethodDescriptor {
    pub execution: Execution,
    pub signature: Signature,
    pub private: bool,
    pub auth: Option<AuthCheck>,
    pub timeout: Option<Duration>,
    /// The result is sent through a `Responder` instead of being returned.
    pub async_result: bool,
}

impl MethodDescriptor {
    pub fn inline<F, Fut>(signature: Signature, func: F) -> Self
    where
        F: Fn(BoundArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MethodResult> + Send + 'static,
    {
        Self::with_execution(
            signature,
            Execution::Inline(Arc::new(move |args| func(args).boxed())),
        )
    }

    pub fn blocking<F>(pool: PoolKind, signature: Signature, func: F) -> Self
    where
        F: Fn(BoundArgs) -> MethodResult + Send + Sync + 'static,
    {
        Self::with_execution(
            signature,
            Execution::Blocking {
                pool,
                func: Arc::new(func),
            },
        )
    }

    fn with_execution(signature: Signature, execution: Execution) -> Self {
        Self {
            execution,
            signature,
            private: false,
            auth: None,
            timeout: None,
            async_result: false,
        }
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn requires_auth<F>(mut self, check: F) -> Self
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        self.auth = Some(Arc::new(check));
        self
    }

    pub fn async_result(mut self) -> Self {
        self.async_result = true;
        self
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let execution = match &self.execution {
            Execution::Inline(_) => "inline".to_string(),
            Execution::Blocking { pool, .. } => format!("blocking({pool:?})"),
        };
        f.debug_struct("MethodDescriptor")
            .field("execution", &execution)
            .field("signature", &self.signature)
            .field("private", &self.private)
            .field("requires_auth", &self.auth.is_some())
            .field("timeout", &self.timeout)
            .field("async_result", &self.async_result)
            .finish()
    }
}

#[derive(Debug)]
pub enum Node {
    Namespace(Namespace),
    Method(Arc<MethodDescriptor>),
}

impl Node {
    pub fn is_private(&self) -> bool {
        match self {
            Self::Namespace(namespace) => namespace.private,
            Self::Method(method) => method.private,
        }
    }
}

#[derive(Debug, Default)]
pub struct Namespace {
    pub private: bool,
    pub children: BTreeMap<String, Node>,
}

impl Namespace {
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.get(name)
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    root: Namespace,
    prefix: Vec<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every method registered through this registry lands under `company.service.`.
    pub fn for_service(company: &str, service: &str) -> Result<Self, AppError> {
        let prefix = format!("{company}.{service}");
        let prefix = split_path(&prefix)?;
        Ok(Self {
            root: Namespace::default(),
            prefix,
        })
    }

    pub fn root(&self) -> &Namespace {
        &self.root
    }

    pub fn prefix(&self) -> String {
        self.prefix.join(".")
    }

    pub fn register(&mut self, name: &str, descriptor: MethodDescriptor) -> Result<(), AppError> {
        let path = self.full_path(name)?;
        let display = path.join(".");
        let Some((leaf, parents)) = path.split_last() else {
            return Err(AppError::invalid_path(name, "path is empty"));
        };

        let mut node = &mut self.root;
        for segment in parents {
            let child = node
                .children
                .entry(segment.clone())
                .or_insert_with(|| Node::Namespace(Namespace::default()));
            node = match child {
                Node::Namespace(namespace) => namespace,
                Node::Method(_) => return Err(AppError::PathConflict(display)),
            };
        }

        if let Some(existing) = node.children.get(leaf) {
            return Err(match existing {
                Node::Method(_) => AppError::DuplicateMethod(display),
                Node::Namespace(_) => AppError::PathConflict(display),
            });
        }
        node.children
            .insert(leaf.clone(), Node::Method(Arc::new(descriptor)));
        Ok(())
    }

    /// Hides an existing namespace and everything below it.
    pub fn set_private(&mut self, name: &str) -> Result<(), AppError> {
        let path = self.full_path(name)?;
        let display = path.join(".");

        let mut node = &mut self.root;
        for segment in &path {
            node = match node.children.get_mut(segment) {
                Some(Node::Namespace(namespace)) => namespace,
                _ => return Err(AppError::UnknownNamespace(display)),
            };
        }
        node.private = true;
        Ok(())
    }

    /// Dotted paths of every method a client can resolve.
    pub fn method_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        collect_public(&self.root, &mut Vec::new(), &mut names);
        names
    }

    fn full_path(&self, name: &str) -> Result<Vec<String>, AppError> {
        let mut path = self.prefix.clone();
        path.extend(split_path(name)?);
        Ok(path)
    }
}

fn split_path(path: &str) -> Result<Vec<String>, AppError> {
    path.split('.')
        .map(|segment| {
            if segment.is_empty() {
                return Err(AppError::invalid_path(path, "empty path segment"));
            }
            if !segment
                .chars()
                .all(|character| character.is_ascii_alphanumeric() || character == '_')
            {
                return Err(AppError::invalid_path(
                    path,
                    "segments may only contain alphanumeric characters and underscores",
                ));
            }
            Ok(segment.to_string())
        })
        .collect()
}

pub(crate) fn is_public(name: &str, node: &Node) -> bool {
    !name.starts_with('_') && !node.is_private()
}

fn collect_public(namespace: &Namespace, path: &mut Vec<String>, names: &mut Vec<String>) {
    for (name, node) in &namespace.children {
        if !is_public(name, node) {
            continue;
        }
        path.push(name.clone());
        match node {
            Node::Namespace(child) => collect_public(child, path, names),
            Node::Method(_) => names.push(path.join(".")),
        }
        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn noop() -> MethodDescriptor {
        MethodDescriptor::inline(Signature::new(), |_args| async { Ok(json!(null)) })
    }

    #[test]
    fn service_prefix_is_applied() {
        let mut registry = Registry::for_service("acme", "billing").expect("valid prefix");
        registry.register("invoice", noop()).expect("register");
        assert_eq!(registry.method_names(), vec!["acme.billing.invoice"]);
        assert_eq!(registry.prefix(), "acme.billing");
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = Registry::new();
        registry.register("math.add", noop()).expect("first");
        let err = registry.register("math.add", noop()).expect_err("duplicate");
        assert!(matches!(err, AppError::DuplicateMethod(path) if path == "math.add"));
    }

    #[test]
    fn registering_through_a_method_conflicts() {
        let mut registry = Registry::new();
        registry.register("math", noop()).expect("first");
        let err = registry.register("math.add", noop()).expect_err("conflict");
        assert!(matches!(err, AppError::PathConflict(_)));
    }

    #[test]
    fn invalid_segments_are_rejected() {
        let mut registry = Registry::new();
        assert!(matches!(
            registry.register("math..add", noop()),
            Err(AppError::InvalidPath { .. })
        ));
        assert!(matches!(
            registry.register("math/add", noop()),
            Err(AppError::InvalidPath { .. })
        ));
    }

    #[test]
    fn method_names_skip_private_entries() {
        let mut registry = Registry::new();
        registry.register("math.add", noop()).expect("add");
        registry.register("math.secret", noop().private()).expect("secret");
        registry.register("math._hidden", noop()).expect("hidden");
        registry.register("internal.reset", noop()).expect("reset");
        registry.set_private("internal").expect("namespace exists");

        assert_eq!(registry.method_names(), vec!["math.add"]);
    }

    #[test]
    fn set_private_requires_existing_namespace() {
        let mut registry = Registry::new();
        registry.register("math.add", noop()).expect("add");
        assert!(matches!(
            registry.set_private("math.add"),
            Err(AppError::UnknownNamespace(_))
        ));
        assert!(matches!(
            registry.set_private("missing"),
            Err(AppError::UnknownNamespace(_))
        ));
    }
}
