use std::sync::Arc;

use fixtura_core::{Attributes, CollectionSchema};

/// What a node of the resolution chain stands for.
#[derive(Debug)]
enum Frame {
    /// A fixture being built for `schema`, with its untransformed attributes.
    Fixture {
        schema: Arc<CollectionSchema>,
        base: Arc<Attributes>,
    },
    /// An upload being created for the parent fixture.
    Upload,
    /// Marker for a generated batch mid-import; the node id is the base.
    Generated,
}

/// Immutable link of the resolution call tree.
///
/// Each recursive resolution step creates a child pointing at its parent,
/// so walking `ancestors` from any node yields the path back to the root.
#[derive(Debug)]
pub struct ResolutionMeta {
    id: String,
    parent: Option<Arc<ResolutionMeta>>,
    frame: Frame,
}

impl ResolutionMeta {
    pub fn fixture(
        id: impl Into<String>,
        schema: Arc<CollectionSchema>,
        base: Arc<Attributes>,
        parent: Option<Arc<ResolutionMeta>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            parent,
            frame: Frame::Fixture { schema, base },
        })
    }

    pub fn upload(path: impl Into<String>, parent: Arc<ResolutionMeta>) -> Arc<Self> {
        Arc::new(Self {
            id: path.into(),
            parent: Some(parent),
            frame: Frame::Upload,
        })
    }

    pub fn generated(base: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: base.into(),
            parent: None,
            frame: Frame::Generated,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent(&self) -> Option<&Arc<ResolutionMeta>> {
        self.parent.as_ref()
    }

    /// Schema of the fixture this node builds.
    pub fn schema(&self) -> Option<&Arc<CollectionSchema>> {
        match &self.frame {
            Frame::Fixture { schema, .. } => Some(schema),
            _ => None,
        }
    }

    /// Untransformed attributes of the fixture this node builds.
    pub fn base(&self) -> Option<&Attributes> {
        match &self.frame {
            Frame::Fixture { base, .. } => Some(base),
            _ => None,
        }
    }

    /// This node followed by each parent up to the root.
    pub fn ancestors(&self) -> impl Iterator<Item = &ResolutionMeta> {
        std::iter::successors(Some(self), |meta| meta.parent.as_deref())
    }

    /// Node ids from the root down to this node.
    pub fn chain(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.ancestors().map(|meta| meta.id.clone()).collect();
        ids.reverse();
        ids
    }

    /// Chain rendered as `root -> ... -> self`, optionally followed by `next`.
    pub fn render_chain(&self, next: Option<&str>) -> String {
        let mut ids = self.chain();
        ids.extend(next.map(str::to_string));
        ids.join(" -> ")
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ancestors().any(|meta| meta.id == id)
    }

    /// Base collection of the closest generated batch on the chain.
    pub fn generated_context(&self) -> Option<&str> {
        self.ancestors()
            .find(|meta| matches!(meta.frame, Frame::Generated))
            .map(|meta| meta.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(id: &str, parent: Option<Arc<ResolutionMeta>>) -> Arc<ResolutionMeta> {
        ResolutionMeta::fixture(
            id,
            Arc::new(CollectionSchema::new("User")),
            Arc::new(Attributes::new()),
            parent,
        )
    }

    #[test]
    fn chain_walks_back_to_root() {
        let root = fixture("users/a", None);
        let child = fixture("posts/b", Some(root.clone()));
        let upload = ResolutionMeta::upload("/tmp/logo.png", child.clone());
        assert_eq!(upload.chain(), vec!["users/a", "posts/b", "/tmp/logo.png"]);
        assert_eq!(child.render_chain(Some("users/a")), "users/a -> posts/b -> users/a");
        assert!(upload.contains("users/a"));
        assert!(!root.contains("posts/b"));
        assert!(upload.schema().is_none());
    }

    #[test]
    fn generated_context_finds_nearest_marker() {
        let marker = ResolutionMeta::generated("posts");
        let entry = fixture("posts/post-1", Some(marker));
        let nested = fixture("users/a", Some(entry.clone()));
        assert_eq!(nested.generated_context(), Some("posts"));
        assert_eq!(fixture("users/b", None).generated_context(), None);
    }
}
