//! Topology: one live instance of a pipeline graph
//!
//! A topology is immutable once built. Nodes only ever compare topologies by
//! identity, the session routes requests and replies along its edges, and
//! its message generator drives the lifecycle of every stream in it.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::message_generator::{ComponentKey, MessageGenerator, StreamListener};
use super::types::{MediaKind, Payload, RequestPacket};

pub type TopologyRef = Arc<Topology>;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_TOPOLOGY_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_COMPONENT_KEY: AtomicU64 = AtomicU64::new(1);

/// Identity of one stream node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u64);

impl StreamId {
    pub fn next() -> Self {
        Self(NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream#{}", self.0)
    }
}

impl ComponentKey {
    pub fn next() -> Self {
        Self(NEXT_COMPONENT_KEY.fetch_add(1, Ordering::Relaxed))
    }
}

/// A node of a topology.
///
/// Each stream belongs to exactly one topology; the component behind it may
/// be shared by several.
pub trait MediaStream: StreamListener {
    fn id(&self) -> StreamId;

    fn component_key(&self) -> ComponentKey;

    fn media_kind(&self) -> Option<MediaKind> {
        None
    }

    /// Called once while the topology owning this stream is being built.
    fn attach_topology(&self, _topology: Weak<Topology>) {}

    /// A downstream node wants data up to `rp.request_time`.
    fn request_sample(&self, rp: &RequestPacket);

    /// An upstream node answered a request, or `prev` is `None` when a node
    /// re-enters its own dispatch loop.
    fn process_sample(&self, prev: Option<StreamId>, payload: Option<Payload>, rp: &RequestPacket);
}

struct Node {
    stream: Arc<dyn MediaStream>,
    listener: Arc<dyn StreamListener>,
    upstream: Vec<StreamId>,
    downstream: Vec<StreamId>,
}

/// Immutable graph of stream nodes sharing a message generator.
pub struct Topology {
    id: u64,
    generator: MessageGenerator,
    nodes: HashMap<StreamId, Node>,
    order: Vec<StreamId>,
    torn_down: AtomicBool,
}

impl Topology {
    pub fn builder() -> TopologyBuilder {
        TopologyBuilder::default()
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn message_generator(&self) -> &MessageGenerator {
        &self.generator
    }

    pub fn stream(&self, id: StreamId) -> Option<&Arc<dyn MediaStream>> {
        self.nodes.get(&id).map(|node| &node.stream)
    }

    /// Streams in the order they were added.
    pub fn streams(&self) -> impl Iterator<Item = &Arc<dyn MediaStream>> {
        self.order.iter().filter_map(|id| self.stream(*id))
    }

    pub fn upstream(&self, id: StreamId) -> &[StreamId] {
        self.nodes
            .get(&id)
            .map(|node| node.upstream.as_slice())
            .unwrap_or_default()
    }

    pub fn downstream(&self, id: StreamId) -> &[StreamId] {
        self.nodes
            .get(&id)
            .map(|node| node.downstream.as_slice())
            .unwrap_or_default()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Detach the topology: replies still in flight for it are discarded.
    pub fn shutdown(&self) {
        if !self.torn_down.swap(true, Ordering::AcqRel) {
            self.generator.clear_listeners();
        }
    }
}

impl PartialEq for Topology {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Topology {}

impl std::fmt::Debug for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topology")
            .field("id", &self.id)
            .field("streams", &self.order)
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}

/// Collects streams and edges, then freezes them into a [`Topology`].
#[derive(Default)]
pub struct TopologyBuilder {
    nodes: HashMap<StreamId, Node>,
    order: Vec<StreamId>,
}

impl TopologyBuilder {
    pub fn add_stream<S: MediaStream + 'static>(&mut self, stream: Arc<S>) -> StreamId {
        let id = stream.id();
        if !self.nodes.contains_key(&id) {
            self.order.push(id);
            self.nodes.insert(
                id,
                Node {
                    listener: stream.clone(),
                    stream,
                    upstream: Vec::new(),
                    downstream: Vec::new(),
                },
            );
        }
        id
    }

    /// Feed the output of `upstream` into `downstream`.
    ///
    /// # Panics
    ///
    /// Panics if either stream was not added first.
    pub fn connect(&mut self, upstream: StreamId, downstream: StreamId) -> &mut Self {
        assert!(
            self.nodes.contains_key(&upstream) && self.nodes.contains_key(&downstream),
            "connect called with a stream that is not part of the topology"
        );
        if let Some(node) = self.nodes.get_mut(&upstream) {
            node.downstream.push(downstream);
        }
        if let Some(node) = self.nodes.get_mut(&downstream) {
            node.upstream.push(upstream);
        }
        self
    }

    pub fn build(self) -> TopologyRef {
        let generator = MessageGenerator::new();
        for id in &self.order {
            if let Some(node) = self.nodes.get(id) {
                generator.register_listener(node.listener.clone(), node.stream.component_key());
            }
        }

        Arc::new_cyclic(|weak| {
            for node in self.nodes.values() {
                node.stream.attach_topology(weak.clone());
            }
            Topology {
                id: NEXT_TOPOLOGY_ID.fetch_add(1, Ordering::Relaxed),
                generator,
                nodes: self.nodes,
                order: self.order,
                torn_down: AtomicBool::new(false),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub {
        id: StreamId,
        key: ComponentKey,
    }

    impl StreamListener for Stub {}

    impl MediaStream for Stub {
        fn id(&self) -> StreamId {
            self.id
        }

        fn component_key(&self) -> ComponentKey {
            self.key
        }

        fn request_sample(&self, _rp: &RequestPacket) {}

        fn process_sample(
            &self,
            _prev: Option<StreamId>,
            _payload: Option<Payload>,
            _rp: &RequestPacket,
        ) {
        }
    }

    fn stub(key: ComponentKey) -> Arc<Stub> {
        Arc::new(Stub {
            id: StreamId::next(),
            key,
        })
    }

    #[test]
    fn test_edges_and_registration() {
        let capture = ComponentKey::next();
        let sink = ComponentKey::next();

        let mut builder = Topology::builder();
        let source = builder.add_stream(stub(capture));
        let video = builder.add_stream(stub(sink));
        let audio = builder.add_stream(stub(sink));
        builder.connect(source, video).connect(source, audio);
        let topology = builder.build();

        assert_eq!(topology.downstream(source), &[video, audio]);
        assert_eq!(topology.upstream(video), &[source]);
        assert!(topology.upstream(source).is_empty());
        assert_eq!(topology.streams().count(), 3);

        let generator = topology.message_generator();
        assert_eq!(generator.component_count(), 2);
        assert!(generator.contains(capture));

        topology.shutdown();
        assert!(topology.is_torn_down());
        assert_eq!(generator.component_count(), 0);
        assert!(topology.stream(video).is_some());
    }

    #[test]
    fn test_identity() {
        let a = Topology::builder().build();
        let b = Topology::builder().build();
        assert_ne!(a.id(), b.id());
        assert_ne!(*a, *b);
        assert_eq!(*a, *a.clone());
    }

    #[test]
    #[should_panic(expected = "not part of the topology")]
    fn test_connect_unknown_stream_panics() {
        let mut builder = Topology::builder();
        let source = builder.add_stream(stub(ComponentKey::next()));
        builder.connect(source, StreamId::next());
    }
}
