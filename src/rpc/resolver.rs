//! Dotted-path resolution against the namespace tree
//!
//! Every failure is the same MethodNotFound fault, whether the path is missing,
//! private, underscore-prefixed, or ends on a namespace.

use std::sync::Arc;

use crate::rpc::{
    fault::Fault,
    registry::{is_public, MethodDescriptor, Namespace, Node},
};

/// Trailing segment that lists the public children of a node.
pub const INTROSPECTION_MARKER: &str = "__dir__";

#[derive(Debug, Clone)]
pub enum Resolution {
    Method(Arc<MethodDescriptor>),
    Listing(Vec<String>),
}

pub fn resolve(root: &Namespace, method_name: &str) -> Result<Resolution, Fault> {
    let segments: Vec<&str> = method_name.split('.').collect();

    if let Some((&INTROSPECTION_MARKER, parents)) = segments.split_last() {
        let namespace = walk_namespaces(root, parents)?;
        return Ok(Resolution::Listing(public_children(namespace)));
    }

    let Some((leaf, parents)) = segments.split_last() else {
        return Err(Fault::method_not_found());
    };
    let namespace = walk_namespaces(root, parents)?;
    match check_segment(namespace, leaf)? {
        Node::Method(method) => Ok(Resolution::Method(Arc::clone(method))),
        Node::Namespace(_) => Err(Fault::method_not_found()),
    }
}

fn walk_namespaces<'a>(root: &'a Namespace, segments: &[&str]) -> Result<&'a Namespace, Fault> {
    let mut namespace = root;
    for segment in segments {
        namespace = match check_segment(namespace, segment)? {
            Node::Namespace(child) => child,
            Node::Method(_) => return Err(Fault::method_not_found()),
        };
    }
    Ok(namespace)
}

fn check_segment<'a>(namespace: &'a Namespace, segment: &str) -> Result<&'a Node, Fault> {
    namespace
        .child(segment)
        .filter(|node| is_public(segment, node))
        .ok_or_else(Fault::method_not_found)
}

fn public_children(namespace: &Namespace) -> Vec<String> {
    namespace
        .children
        .iter()
        .filter(|(name, node)| is_public(name, node))
        .map(|(name, _)| name.clone())
        .collect()
}
