//! Route trie
//!
//! Radix tree keyed by HTTP method bitmask. Patterns are split into
//! literal runs, single-segment parameters (`{name}` / `{name:regex}`) and a
//! trailing catch-all (`*`). Literal runs are prefix-compressed and split on
//! divergence; each node carries at most one literal child per leading byte,
//! at most one parameter child and at most one catch-all child. Lookup
//! walks children in fixed priority literal > param > catch-all, popping
//! parameter captures when a sub-lookup fails.
//!
//! Parameter *values* are captured positionally during descent; the matched
//! endpoint stores the ordered key names parsed from its pattern and the
//! two are zipped together at the terminal. That is what allows
//! `/ping/{id}` and `/ping/{iidd}/woop` to share one parameter node while
//! reporting different key names.

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;

use crate::context::RouteContext;
use crate::handler::ArcHandler;
use crate::mux::Mux;

/// Bitmask over the canonical HTTP methods, plus `ALL` (any method) and an
/// internal stub bit marking mount pass-through endpoints that introspection
/// must not report.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct MethodMask(u16);

impl MethodMask {
    pub(crate) const STUB: MethodMask = MethodMask(1 << 0);
    pub const CONNECT: MethodMask = MethodMask(1 << 1);
    pub const DELETE: MethodMask = MethodMask(1 << 2);
    pub const GET: MethodMask = MethodMask(1 << 3);
    pub const HEAD: MethodMask = MethodMask(1 << 4);
    pub const OPTIONS: MethodMask = MethodMask(1 << 5);
    pub const PATCH: MethodMask = MethodMask(1 << 6);
    pub const POST: MethodMask = MethodMask(1 << 7);
    pub const PUT: MethodMask = MethodMask(1 << 8);
    pub const TRACE: MethodMask = MethodMask(1 << 9);

    /// Every real method, excluding the stub bit.
    pub const ALL: MethodMask = MethodMask(0b11_1111_1110);

    const VERBS: [(MethodMask, &'static str); 9] = [
        (MethodMask::CONNECT, "CONNECT"),
        (MethodMask::DELETE, "DELETE"),
        (MethodMask::GET, "GET"),
        (MethodMask::HEAD, "HEAD"),
        (MethodMask::OPTIONS, "OPTIONS"),
        (MethodMask::PATCH, "PATCH"),
        (MethodMask::POST, "POST"),
        (MethodMask::PUT, "PUT"),
        (MethodMask::TRACE, "TRACE"),
    ];

    /// Mask for a method name, case-insensitive. `None` for methods the
    /// router does not know about.
    pub fn from_name(name: &str) -> Option<MethodMask> {
        Self::VERBS
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(m, _)| *m)
    }

    pub(crate) fn from_method(method: &http::Method) -> Option<MethodMask> {
        Self::from_name(method.as_str())
    }

    pub(crate) fn name(self) -> Option<&'static str> {
        Self::VERBS
            .iter()
            .find(|(m, _)| *m == self)
            .map(|(_, n)| *n)
    }

    pub(crate) fn bits(self) -> u16 {
        self.0
    }

    pub(crate) fn contains(self, other: MethodMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for MethodMask {
    type Output = MethodMask;

    fn bitor(self, rhs: MethodMask) -> MethodMask {
        MethodMask(self.0 | rhs.0)
    }
}

/// Terminal routing record: the composed handler plus the pattern it was
/// registered under and the ordered parameter keys parsed from it.
#[derive(Clone)]
pub(crate) struct Endpoint {
    pub(crate) handler: ArcHandler,
    pub(crate) pattern: String,
    pub(crate) param_keys: Arc<[String]>,
}

/// One route as reported by introspection: the pattern, the handler per
/// method name (`*` for handlers registered against every method), and the
/// mounted sub-router when the route is a mount point.
#[derive(Clone)]
pub struct RouteInfo {
    pub pattern: String,
    pub handlers: BTreeMap<String, ArcHandler>,
    pub subroutes: Option<Arc<Mux>>,
}

/// One vertex of the routing trie. The kind of a node (literal, param,
/// catch-all) is encoded by which child bucket of its parent holds it.
pub(crate) struct Node {
    // Literal byte prefix; may span several path segments. Empty on the
    // root and on param/catch-all nodes.
    prefix: String,

    // Anchored matcher for constrained parameter nodes, with the original
    // constraint text kept for conflict detection.
    constraint: Option<Regex>,
    constraint_source: Option<String>,

    static_children: Vec<Node>,
    param_child: Option<Box<Node>>,
    catch_all_child: Option<Box<Node>>,

    // Method bit -> endpoint. Registering `ALL` populates every verb bit so
    // lookup stays a single map probe.
    endpoints: BTreeMap<u16, Endpoint>,

    // Mounted sub-router, set on the catch-all stub of a mount point.
    pub(crate) subroutes: Option<Arc<Mux>>,
}

impl Node {
    pub(crate) fn new() -> Node {
        Node::literal(String::new())
    }

    fn literal(prefix: String) -> Node {
        Node {
            prefix,
            constraint: None,
            constraint_source: None,
            static_children: Vec::new(),
            param_child: None,
            catch_all_child: None,
            endpoints: BTreeMap::new(),
            subroutes: None,
        }
    }

    fn param(constraint_source: Option<String>) -> Node {
        let constraint = constraint_source.as_deref().map(compile_constraint);
        Node {
            constraint,
            constraint_source,
            ..Node::literal(String::new())
        }
    }

    /// Insert a routing pattern for the given method mask. Returns the
    /// terminal node so mounts can attach their sub-router reference.
    /// Registering the same pattern and method again silently replaces the
    /// handler.
    pub(crate) fn insert_route(
        &mut self,
        method: MethodMask,
        pattern: &str,
        handler: ArcHandler,
    ) -> &mut Node {
        let param_keys: Arc<[String]> = validate_pattern(pattern).into();
        self.insert(pattern, &Registration {
            method,
            pattern,
            handler,
            param_keys,
        })
    }

    fn insert(&mut self, search: &str, reg: &Registration) -> &mut Node {
        if search.is_empty() {
            self.set_endpoint(reg);
            return self;
        }

        match search.as_bytes()[0] {
            b'{' => {
                let close = param_close(search)
                    .unwrap_or_else(|| panic!("switchyard: unbalanced braces in routing pattern '{}'", reg.pattern));
                let (_, constraint) = split_param(&search[1..close]);

                match &self.param_child {
                    Some(child) if child.constraint_source.as_deref() != constraint => {
                        panic!(
                            "switchyard: routing pattern '{}' conflicts with an existing parameter segment",
                            reg.pattern
                        );
                    }
                    Some(_) => {}
                    None => {
                        self.param_child =
                            Some(Box::new(Node::param(constraint.map(str::to_owned))));
                    }
                }
                self.param_child
                    .as_mut()
                    .expect("param child just ensured")
                    .insert(&search[close + 1..], reg)
            }
            b'*' => {
                if self.catch_all_child.is_none() {
                    self.catch_all_child = Some(Box::new(Node::literal(String::new())));
                }
                // the catch-all is necessarily terminal
                self.catch_all_child
                    .as_mut()
                    .expect("catch-all child just ensured")
                    .insert("", reg)
            }
            label => {
                let end = search
                    .find(|c| c == '{' || c == '*')
                    .unwrap_or(search.len());
                let lit = &search[..end];

                let idx = self
                    .static_children
                    .iter()
                    .position(|c| c.prefix.as_bytes()[0] == label);

                match idx {
                    None => {
                        self.static_children.push(Node::literal(lit.to_string()));
                        let idx = self.static_children.len() - 1;
                        self.static_children[idx].insert(&search[end..], reg)
                    }
                    Some(idx) => {
                        let common = longest_common_prefix(&self.static_children[idx].prefix, lit);
                        if common == self.static_children[idx].prefix.len() {
                            return self.static_children[idx].insert(&search[common..], reg);
                        }

                        // classical radix split: the existing child keeps its
                        // diverging suffix under a new intermediate node
                        let child = &mut self.static_children[idx];
                        let head = child.prefix[..common].to_string();
                        let tail = child.prefix[common..].to_string();
                        let mut old = std::mem::replace(child, Node::literal(head));
                        old.prefix = tail;
                        child.static_children.push(old);
                        child.insert(&search[common..], reg)
                    }
                }
            }
        }
    }

    fn set_endpoint(&mut self, reg: &Registration) {
        let endpoint = Endpoint {
            handler: reg.handler.clone(),
            pattern: reg.pattern.to_string(),
            param_keys: reg.param_keys.clone(),
        };

        if reg.method.contains(MethodMask::STUB) {
            self.endpoints.insert(
                MethodMask::STUB.bits(),
                Endpoint {
                    handler: reg.handler.clone(),
                    pattern: String::new(),
                    param_keys: Arc::from(Vec::new()),
                },
            );
        }
        if reg.method.contains(MethodMask::ALL) {
            self.endpoints
                .insert(MethodMask::ALL.bits(), endpoint.clone());
            for (verb, _) in MethodMask::VERBS {
                self.endpoints.insert(verb.bits(), endpoint.clone());
            }
        } else {
            for (verb, _) in MethodMask::VERBS {
                if reg.method.contains(verb) {
                    self.endpoints.insert(verb.bits(), endpoint.clone());
                }
            }
        }
    }

    /// Look up `(method, path)` and return the matched handler plus the
    /// mounted sub-router, if the terminal is a mount point. Captured
    /// parameters, the matched pattern and the method-not-allowed flag are
    /// recorded on the routing context.
    pub(crate) fn find_route(
        &self,
        ctx: &mut RouteContext,
        method: MethodMask,
        path: &str,
    ) -> Option<(ArcHandler, Option<Arc<Mux>>)> {
        ctx.route_pattern.clear();
        ctx.route_params.clear();

        let node = self.find(ctx, method.bits(), path)?;
        let endpoint = node.endpoints.get(&method.bits())?;

        ctx.route_params
            .keys
            .extend(endpoint.param_keys.iter().cloned());

        // surface the captures for the rest of the request lifecycle
        ctx.url_params
            .keys
            .extend(ctx.route_params.keys.iter().cloned());
        ctx.url_params
            .values
            .extend(ctx.route_params.values.iter().cloned());

        if !endpoint.pattern.is_empty() {
            ctx.route_pattern.push_str(&endpoint.pattern);
            ctx.route_patterns.push(endpoint.pattern.clone());
        }

        Some((endpoint.handler.clone(), node.subroutes.clone()))
    }

    fn find<'t>(&'t self, ctx: &mut RouteContext, method: u16, path: &str) -> Option<&'t Node> {
        if path.is_empty() {
            if self.endpoints.contains_key(&method) {
                return Some(self);
            }
            if !self.endpoints.is_empty() {
                ctx.method_not_allowed = true;
            }
            // a catch-all still matches an empty remainder
            if let Some(child) = self.catch_all_child.as_deref() {
                ctx.route_params.values.push(String::new());
                if child.endpoints.contains_key(&method) {
                    return Some(child);
                }
                if !child.endpoints.is_empty() {
                    ctx.method_not_allowed = true;
                }
                ctx.route_params.values.pop();
            }
            return None;
        }

        let label = path.as_bytes()[0];

        // literal child first
        if let Some(child) = self
            .static_children
            .iter()
            .find(|c| c.prefix.as_bytes()[0] == label)
        {
            if let Some(rest) = path.strip_prefix(child.prefix.as_str()) {
                if let Some(found) = child.find(ctx, method, rest) {
                    return Some(found);
                }
            }
        }

        // then a single-segment parameter; pop the capture if the
        // sub-lookup fails and fall through to the next kind
        if let Some(child) = &self.param_child {
            let seg_end = path.find('/').unwrap_or(path.len());
            if seg_end > 0 {
                let value = &path[..seg_end];
                if child
                    .constraint
                    .as_ref()
                    .map_or(true, |re| re.is_match(value))
                {
                    ctx.route_params.values.push(value.to_string());
                    if let Some(found) = child.find(ctx, method, &path[seg_end..]) {
                        return Some(found);
                    }
                    ctx.route_params.values.pop();
                }
            }
        }

        // catch-all is the last resort and consumes the whole remainder
        if let Some(child) = self.catch_all_child.as_deref() {
            ctx.route_params.values.push(path.to_string());
            if child.endpoints.contains_key(&method) {
                return Some(child);
            }
            if !child.endpoints.is_empty() {
                ctx.method_not_allowed = true;
            }
            ctx.route_params.values.pop();
        }

        None
    }

    /// Structural check whether a routing pattern is already present. Used
    /// to refuse mounting over an existing subtree.
    pub(crate) fn find_pattern(&self, pattern: &str) -> bool {
        if pattern.is_empty() {
            return true;
        }
        match pattern.as_bytes()[0] {
            b'{' => match (&self.param_child, param_close(pattern)) {
                (Some(child), Some(close)) => child.find_pattern(&pattern[close + 1..]),
                _ => false,
            },
            b'*' => self.catch_all_child.is_some(),
            label => {
                let child = self
                    .static_children
                    .iter()
                    .find(|c| c.prefix.as_bytes()[0] == label);
                match child {
                    Some(child) => {
                        let common = longest_common_prefix(&child.prefix, pattern);
                        if common == child.prefix.len() {
                            child.find_pattern(&pattern[common..])
                        } else {
                            false
                        }
                    }
                    None => false,
                }
            }
        }
    }

    /// Flatten the trie into routing information, skipping mount stub
    /// endpoints that exist only to forward into a child.
    pub(crate) fn collect_routes(&self, out: &mut Vec<RouteInfo>) {
        let stub_only = self.endpoints.contains_key(&MethodMask::STUB.bits())
            && self.subroutes.is_none();

        if !self.endpoints.is_empty() && !stub_only {
            // group endpoints by pattern; methods registered later under a
            // different param spelling stay separate entries
            let mut grouped: BTreeMap<&str, BTreeMap<String, ArcHandler>> = BTreeMap::new();
            for (&bits, endpoint) in &self.endpoints {
                if bits == MethodMask::STUB.bits() || endpoint.pattern.is_empty() {
                    continue;
                }
                let name = if bits == MethodMask::ALL.bits() {
                    "*".to_string()
                } else {
                    match MethodMask(bits).name() {
                        Some(name) => name.to_string(),
                        None => continue,
                    }
                };
                grouped
                    .entry(endpoint.pattern.as_str())
                    .or_default()
                    .insert(name, endpoint.handler.clone());
            }
            for (pattern, handlers) in grouped {
                out.push(RouteInfo {
                    pattern: pattern.to_string(),
                    handlers,
                    subroutes: self.subroutes.clone(),
                });
            }
        }

        for child in &self.static_children {
            child.collect_routes(out);
        }
        if let Some(child) = &self.param_child {
            child.collect_routes(out);
        }
        if let Some(child) = &self.catch_all_child {
            child.collect_routes(out);
        }
    }

    /// Every mounted sub-router in this subtree.
    pub(crate) fn collect_subrouters(&self, out: &mut Vec<Arc<Mux>>) {
        if let Some(sub) = &self.subroutes {
            out.push(Arc::clone(sub));
        }
        for child in &self.static_children {
            child.collect_subrouters(out);
        }
        if let Some(child) = &self.param_child {
            child.collect_subrouters(out);
        }
        if let Some(child) = &self.catch_all_child {
            child.collect_subrouters(out);
        }
    }
}

struct Registration<'p> {
    method: MethodMask,
    pattern: &'p str,
    handler: ArcHandler,
    param_keys: Arc<[String]>,
}

/// Validate a routing pattern and return its ordered parameter keys (the
/// catch-all contributes the synthetic key `*`). Panics on malformed
/// patterns; registration is construction-phase only and a bad pattern is a
/// programming error.
fn validate_pattern(pattern: &str) -> Vec<String> {
    if !pattern.starts_with('/') {
        panic!("switchyard: routing pattern must begin with '/' in '{pattern}'");
    }

    let mut keys: Vec<String> = Vec::new();
    let bytes = pattern.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' => {
                if bytes[i - 1] != b'/' {
                    panic!("switchyard: parameter must span a full path segment in '{pattern}'");
                }
                let close = param_close(&pattern[i..])
                    .map(|c| i + c)
                    .unwrap_or_else(|| panic!("switchyard: unbalanced braces in routing pattern '{pattern}'"));
                let (name, _) = split_param(&pattern[i + 1..close]);
                if name.is_empty() {
                    panic!("switchyard: empty parameter name in routing pattern '{pattern}'");
                }
                if keys.iter().any(|k| k == name) {
                    panic!("switchyard: routing pattern '{pattern}' contains duplicate parameter key '{name}'");
                }
                keys.push(name.to_string());

                i = close + 1;
                if i < bytes.len() && bytes[i] != b'/' {
                    panic!("switchyard: parameter must span a full path segment in '{pattern}'");
                }
            }
            b'}' => panic!("switchyard: unbalanced braces in routing pattern '{pattern}'"),
            b'*' => {
                if i != bytes.len() - 1 {
                    panic!("switchyard: catch-all '*' must be the final segment in '{pattern}'");
                }
                keys.push("*".to_string());
                i += 1;
            }
            _ => i += 1,
        }
    }

    keys
}

/// Index of the `}` closing the parameter that `s` starts with, counting
/// nested braces so regex constraints like `{id:\d{2,4}}` scan correctly.
fn param_close(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in s.bytes().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split the text inside braces into the key name and the optional regex
/// constraint after the first `:`.
fn split_param(inner: &str) -> (&str, Option<&str>) {
    match inner.split_once(':') {
        Some((name, constraint)) => (name, Some(constraint)),
        None => (inner, None),
    }
}

/// Compile a parameter constraint so it must match the whole segment.
fn compile_constraint(source: &str) -> Regex {
    let mut pattern = String::with_capacity(source.len() + 2);
    if !source.starts_with('^') {
        pattern.push('^');
    }
    pattern.push_str(source);
    if !source.ends_with('$') {
        pattern.push('$');
    }
    Regex::new(&pattern)
        .unwrap_or_else(|err| panic!("switchyard: invalid parameter constraint '{source}': {err}"))
}

fn longest_common_prefix(a: &str, b: &str) -> usize {
    let mut n = a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count();
    // never split a multi-byte character across nodes
    while !a.is_char_boundary(n) {
        n -= 1;
    }
    n
}
