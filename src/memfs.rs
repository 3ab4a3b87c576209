//! Simple in-memory resource tree.
//!
//! This implementation has state, so if you create a
//! new instance in a handler(), it will be empty every time.
//!
//! This means you have to create the instance once, using `MemFs::new`, store
//! it in your handler struct, and clone() it every time you pass
//! it to the DavHandler. As a MemFs struct is just a handle, cloning is cheap.
//!
//! Every node implements all capability traits that apply to it: files
//! are getable, replaceable and lockable; directories are collections
//! that accept PUT, MKCOL and lock-null LOCK. All nodes carry dead
//! properties. Locks are kept in an embedded [`MemLs`].
//!
//! ```
//! use dav_engine::{DavHandler, memfs::MemFs};
//!
//! let fs = MemFs::new();
//! fs.create_dir("/docs").unwrap();
//! fs.create_file("/docs/readme.txt", "hello").unwrap();
//! let dav = DavHandler::builder().resolver(fs).build_handler();
//! ```
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use bytes::Bytes;
use http::StatusCode;
use parking_lot::{Mutex, RwLock};
use xmltree::Element;

use crate::auth::{Auth, DigestResponse};
use crate::davpath::encode_segment;
use crate::ls::{LockInfo, LockManager, LockResult, LockTimeout, LockToken};
use crate::memls::MemLs;
use crate::props::QName;
use crate::request::DavRequest;
use crate::resource::*;
use crate::tree::{self, ROOT_ID};
use crate::util::DavMethod;
use crate::{DavError, DavResult};

type Tree = tree::Tree<MemFsNode>;

static NEXT_FS_ID: AtomicU64 = AtomicU64::new(1);

/// Ephemeral in-memory resource tree.
#[derive(Debug, Clone)]
pub struct MemFs {
    inner: Arc<MemFsInner>,
}

#[derive(Debug)]
struct MemFsInner {
    fs_id: u64,
    tree: Mutex<Tree>,
    ls: Box<MemLs>,
    users: RwLock<HashMap<String, MemUser>>,
    quota: Option<u64>,
    realm: String,
}

#[derive(Debug, Clone)]
struct MemUser {
    password: String,
    can_write: bool,
}

#[derive(Debug, Clone)]
enum MemFsNode {
    Dir(MemFsDirNode),
    File(MemFsFileNode),
}

#[derive(Debug, Clone)]
struct MemFsDirNode {
    props: BTreeMap<QName, Element>,
    mtime: SystemTime,
    crtime: SystemTime,
}

#[derive(Debug, Clone)]
struct MemFsFileNode {
    props: BTreeMap<QName, Element>,
    mtime: SystemTime,
    crtime: SystemTime,
    content_type: Option<String>,
    data: Vec<u8>,
}

/// One node of a [`MemFs`], as handed out by the resolver.
#[derive(Debug, Clone)]
pub struct MemResource {
    fs: MemFs,
    id: u64,
}

impl MemFsNode {
    fn new_dir() -> MemFsNode {
        let now = SystemTime::now();
        MemFsNode::Dir(MemFsDirNode {
            props: BTreeMap::new(),
            mtime: now,
            crtime: now,
        })
    }

    fn new_file(data: Vec<u8>, content_type: Option<String>) -> MemFsNode {
        let now = SystemTime::now();
        MemFsNode::File(MemFsFileNode {
            props: BTreeMap::new(),
            mtime: now,
            crtime: now,
            content_type,
            data,
        })
    }

    fn update_mtime(&mut self, tm: SystemTime) {
        match self {
            MemFsNode::Dir(d) => d.mtime = tm,
            MemFsNode::File(f) => f.mtime = tm,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, MemFsNode::Dir(_))
    }

    fn mtime(&self) -> SystemTime {
        match self {
            MemFsNode::Dir(d) => d.mtime,
            MemFsNode::File(f) => f.mtime,
        }
    }

    fn crtime(&self) -> SystemTime {
        match self {
            MemFsNode::Dir(d) => d.crtime,
            MemFsNode::File(f) => f.crtime,
        }
    }

    fn as_file_mut(&mut self) -> DavResult<&mut MemFsFileNode> {
        match self {
            MemFsNode::File(f) => Ok(f),
            MemFsNode::Dir(_) => Err(DavError::Status(StatusCode::METHOD_NOT_ALLOWED)),
        }
    }

    fn get_props(&self) -> &BTreeMap<QName, Element> {
        match self {
            MemFsNode::Dir(d) => &d.props,
            MemFsNode::File(f) => &f.props,
        }
    }

    fn get_props_mut(&mut self) -> &mut BTreeMap<QName, Element> {
        match self {
            MemFsNode::Dir(d) => &mut d.props,
            MemFsNode::File(f) => &mut f.props,
        }
    }

    fn len(&self) -> u64 {
        match self {
            MemFsNode::Dir(_) => 0,
            MemFsNode::File(f) => f.data.len() as u64,
        }
    }

    // a copy with fresh timestamps.
    fn duplicate(&self) -> MemFsNode {
        let mut n = self.clone();
        let now = SystemTime::now();
        match n {
            MemFsNode::Dir(ref mut d) => {
                d.mtime = now;
                d.crtime = now;
            }
            MemFsNode::File(ref mut f) => {
                f.mtime = now;
                f.crtime = now;
            }
        }
        n
    }
}

fn segments(path: &str) -> Vec<String> {
    path.split('/').filter(|s| !s.is_empty()).map(|s| s.to_string()).collect()
}

impl Default for MemFs {
    fn default() -> Self {
        MemFs::new()
    }
}

impl MemFs {
    /// Create a new "memfs" tree with an empty root collection.
    pub fn new() -> MemFs {
        MemFs::build(MemLs::new(), None, "memfs")
    }

    fn build(ls: Box<MemLs>, quota: Option<u64>, realm: &str) -> MemFs {
        MemFs {
            inner: Arc::new(MemFsInner {
                fs_id: NEXT_FS_ID.fetch_add(1, Ordering::Relaxed),
                tree: Mutex::new(Tree::new(MemFsNode::new_dir())),
                ls,
                users: RwLock::new(HashMap::new()),
                quota,
                realm: realm.to_string(),
            }),
        }
    }

    /// A tree that can hold at most `bytes` of content.
    pub fn with_quota(bytes: u64) -> MemFs {
        MemFs::build(MemLs::new(), Some(bytes), "memfs")
    }

    /// A tree using a specific lock manager and realm.
    pub fn with_lock_manager(ls: Box<MemLs>, realm: &str) -> MemFs {
        MemFs::build(ls, None, realm)
    }

    /// Add a user. As soon as one user exists, every request must log in.
    /// Users without `can_write` may only read.
    pub fn add_user(&self, name: &str, password: &str, can_write: bool) {
        self.inner.users.write().insert(
            name.to_string(),
            MemUser {
                password: password.to_string(),
                can_write,
            },
        );
    }

    /// Create a collection. The parent must exist.
    pub fn create_dir(&self, path: &str) -> DavResult<()> {
        let (parent, name) = self.split(path)?;
        self.inner.tree.lock().add_child(parent, &name, MemFsNode::new_dir())?;
        Ok(())
    }

    /// Create or overwrite a file. The parent must exist.
    pub fn create_file(&self, path: &str, data: impl Into<Bytes>) -> DavResult<()> {
        let (parent, name) = self.split(path)?;
        self.put_file(parent, &name, data.into().to_vec(), None).map(|_| ())
    }

    /// The content of a file, if it exists.
    pub fn read_file(&self, path: &str) -> Option<Bytes> {
        let tree = self.inner.tree.lock();
        let id = tree.lookup(&segments(path))?;
        match tree.get_node(id).ok()? {
            MemFsNode::File(f) => Some(Bytes::from(f.data.clone())),
            MemFsNode::Dir(_) => None,
        }
    }

    /// Does a node exist at `path`.
    pub fn exists(&self, path: &str) -> bool {
        self.inner.tree.lock().lookup(&segments(path)).is_some()
    }

    /// The embedded lock manager.
    pub fn lock_manager(&self) -> &MemLs {
        &self.inner.ls
    }

    // parent id and name of a path whose parent must exist.
    fn split(&self, path: &str) -> DavResult<(u64, String)> {
        let mut segs = segments(path);
        let name = segs.pop().ok_or(DavError::Status(StatusCode::METHOD_NOT_ALLOWED))?;
        let tree = self.inner.tree.lock();
        let parent = tree.lookup(&segs).ok_or(DavError::Conflict)?;
        if !tree.get_node(parent)?.is_dir() {
            return Err(DavError::Conflict);
        }
        Ok((parent, name))
    }

    fn put_file(&self, parent: u64, name: &str, data: Vec<u8>, content_type: Option<String>) -> DavResult<u64> {
        let tree = &mut *self.inner.tree.lock();
        match tree.get_child(parent, name) {
            Some(id) => {
                let node = tree.get_node_mut(id)?;
                let f = node.as_file_mut().map_err(|_| DavError::Conflict)?;
                f.data = data;
                if content_type.is_some() {
                    f.content_type = content_type;
                }
                node.update_mtime(SystemTime::now());
                Ok(id)
            }
            None => {
                let id = tree.add_child(parent, name, MemFsNode::new_file(data, content_type))?;
                tree.get_node_mut(parent)?.update_mtime(SystemTime::now());
                Ok(id)
            }
        }
    }

    fn resource(&self, id: u64) -> MemResource {
        MemResource { fs: self.clone(), id }
    }

    fn used_bytes(&self) -> u64 {
        self.inner.tree.lock().all_nodes().map(|n| n.len()).sum()
    }

    fn unique_id(&self, id: u64) -> String {
        format!("memfs{}-{}", self.inner.fs_id, id)
    }

    // node id of a resource of this tree.
    fn node_id_of(&self, res: &dyn Resource) -> Option<u64> {
        let uid = res.unique_id()?;
        let rest = uid.strip_prefix(&format!("memfs{}-", self.inner.fs_id))?;
        rest.parse().ok()
    }

    // drop the locks of a node and everything below it.
    fn release_locks(&self, ids: &[u64]) {
        for &id in ids {
            let uid = self.unique_id(id);
            if let Some(t) = self.inner.ls.current_token(&uid) {
                debug!("memfs: releasing lock {} on {}", t.token_id, uid);
                let _ = self.inner.ls.unlock(&t.token_id, &uid);
            }
        }
    }
}

impl ResourceResolver for MemFs {
    fn resolve(&self, _host: &str, path: &str) -> DavResult<Option<Box<dyn Resource>>> {
        let id = self.inner.tree.lock().lookup(&segments(path));
        Ok(id.map(|id| Box::new(self.resource(id)) as Box<dyn Resource>))
    }
}

impl MemResource {
    fn with_node<T>(&self, f: impl FnOnce(&MemFsNode) -> T) -> Option<T> {
        let tree = self.fs.inner.tree.lock();
        tree.get_node(self.id).ok().map(f)
    }

    fn with_node_mut<T>(&self, f: impl FnOnce(&mut MemFsNode) -> DavResult<T>) -> DavResult<T> {
        let mut tree = self.fs.inner.tree.lock();
        f(tree.get_node_mut(self.id)?)
    }

    fn is_dir(&self) -> bool {
        self.with_node(|n| n.is_dir()).unwrap_or(false)
    }

    fn dest_dir(&self, dest: &dyn Resource) -> DavResult<u64> {
        let id = self.fs.node_id_of(dest).ok_or(DavError::Status(StatusCode::BAD_GATEWAY))?;
        let tree = self.fs.inner.tree.lock();
        if !tree.get_node(id)?.is_dir() {
            return Err(DavError::Conflict);
        }
        Ok(id)
    }

    // html listing of a directory.
    fn index_html(&self) -> DavResult<Bytes> {
        let tree = self.fs.inner.tree.lock();
        let title = match tree.name(self.id)? {
            "" => "/".to_string(),
            name => htmlescape::encode_minimal(name),
        };
        let mut w = String::new();
        let _ = write!(
            w,
            "<html><head><title>Index of {0}</title></head><body><h1>Index of {0}</h1><ul>",
            title
        );
        for c in tree.get_children(self.id)? {
            let name = tree.name(c)?;
            let slash = if tree.get_node(c)?.is_dir() { "/" } else { "" };
            let _ = write!(
                w,
                "<li><a href=\"{}{}\">{}{}</a></li>",
                encode_segment(name),
                slash,
                htmlescape::encode_minimal(name),
                slash
            );
        }
        w.push_str("</ul></body></html>\n");
        Ok(Bytes::from(w))
    }
}

impl Resource for MemResource {
    fn unique_id(&self) -> Option<String> {
        Some(self.fs.unique_id(self.id))
    }

    fn name(&self) -> String {
        let tree = self.fs.inner.tree.lock();
        tree.name(self.id).map(|n| n.to_string()).unwrap_or_default()
    }

    fn modified(&self) -> Option<SystemTime> {
        self.with_node(|n| n.mtime())
    }

    fn authorise(&self, _req: &DavRequest, method: DavMethod, auth: Option<&Auth>) -> bool {
        let users = self.fs.inner.users.read();
        if users.is_empty() {
            return true;
        }
        let Some(user) = auth.filter(|a| a.is_logged_in()).and_then(|a| a.user.as_ref()) else {
            return false;
        };
        match users.get(user) {
            Some(u) => u.can_write || !method.is_write(),
            None => false,
        }
    }

    fn authenticate(&self, user: &str, password: &str) -> Option<String> {
        let users = self.fs.inner.users.read();
        match users.get(user) {
            Some(u) if u.password == password => Some(user.to_string()),
            _ => None,
        }
    }

    fn realm(&self) -> String {
        self.fs.inner.realm.clone()
    }

    fn as_getable(&self) -> Option<&dyn GetableResource> {
        Some(self)
    }

    fn as_replaceable(&self) -> Option<&dyn ReplaceableResource> {
        if self.is_dir() { None } else { Some(self) }
    }

    fn as_putable(&self) -> Option<&dyn PutableResource> {
        if self.is_dir() { Some(self) } else { None }
    }

    fn as_collection(&self) -> Option<&dyn CollectionResource> {
        if self.is_dir() { Some(self) } else { None }
    }

    fn as_make_collection(&self) -> Option<&dyn MakeCollectionableResource> {
        if self.is_dir() { Some(self) } else { None }
    }

    fn as_deletable(&self) -> Option<&dyn DeletableResource> {
        if self.id == ROOT_ID { None } else { Some(self) }
    }

    fn as_copyable(&self) -> Option<&dyn CopyableResource> {
        Some(self)
    }

    fn as_moveable(&self) -> Option<&dyn MoveableResource> {
        if self.id == ROOT_ID { None } else { Some(self) }
    }

    fn as_lockable(&self) -> Option<&dyn LockableResource> {
        Some(self)
    }

    fn as_locking_collection(&self) -> Option<&dyn LockingCollectionResource> {
        if self.is_dir() { Some(self) } else { None }
    }

    fn as_propfindable(&self) -> Option<&dyn PropFindableResource> {
        Some(self)
    }

    fn as_quota(&self) -> Option<&dyn QuotaResource> {
        self.fs.inner.quota.map(|_| self as &dyn QuotaResource)
    }

    fn as_custom_properties(&self) -> Option<&dyn CustomPropertyResource> {
        Some(self)
    }

    fn as_digest(&self) -> Option<&dyn DigestResource> {
        Some(self)
    }
}

impl GetableResource for MemResource {
    fn content(&self) -> DavResult<Bytes> {
        if self.is_dir() {
            return self.index_html();
        }
        let tree = self.fs.inner.tree.lock();
        match tree.get_node(self.id)? {
            MemFsNode::File(f) => Ok(Bytes::from(f.data.clone())),
            MemFsNode::Dir(_) => Err(DavError::NotFound),
        }
    }

    fn content_type(&self, _accept: Option<&str>) -> Option<String> {
        let ct = self.with_node(|n| match n {
            MemFsNode::Dir(_) => Some("text/html; charset=utf-8".to_string()),
            MemFsNode::File(f) => f.content_type.clone(),
        });
        ct.flatten()
            .or_else(|| Some(mime_guess::from_path(self.name()).first_or_octet_stream().to_string()))
    }

    fn content_length(&self) -> Option<u64> {
        self.with_node(|n| n.len())
    }
}

impl ReplaceableResource for MemResource {
    fn replace_content(&self, data: Bytes) -> DavResult<()> {
        self.with_node_mut(|n| {
            n.as_file_mut()?.data = data.to_vec();
            n.update_mtime(SystemTime::now());
            Ok(())
        })
    }

    fn replace_partial(&self, offset: u64, data: Bytes) -> DavResult<()> {
        self.with_node_mut(|n| {
            let f = n.as_file_mut()?;
            let start = usize::try_from(offset)
                .map_err(|_| DavError::Status(StatusCode::RANGE_NOT_SATISFIABLE))?;
            let end = start
                .checked_add(data.len())
                .ok_or(DavError::Status(StatusCode::RANGE_NOT_SATISFIABLE))?;
            if start > f.data.len() {
                return Err(DavError::Status(StatusCode::RANGE_NOT_SATISFIABLE));
            }
            if f.data.len() < end {
                f.data.resize(end, 0);
            }
            f.data[start..end].copy_from_slice(&data);
            n.update_mtime(SystemTime::now());
            Ok(())
        })
    }
}

impl PutableResource for MemResource {
    fn create_new(&self, name: &str, data: Bytes, content_type: Option<&str>) -> DavResult<Box<dyn Resource>> {
        let id = self
            .fs
            .put_file(self.id, name, data.to_vec(), content_type.map(|c| c.to_string()))?;
        Ok(Box::new(self.fs.resource(id)))
    }
}

impl CollectionResource for MemResource {
    fn child(&self, name: &str) -> DavResult<Option<Box<dyn Resource>>> {
        let id = self.fs.inner.tree.lock().get_child(self.id, name);
        Ok(id.map(|id| Box::new(self.fs.resource(id)) as Box<dyn Resource>))
    }

    fn children(&self) -> DavResult<Vec<Box<dyn Resource>>> {
        let ids = self.fs.inner.tree.lock().get_children(self.id)?;
        Ok(ids
            .into_iter()
            .map(|id| Box::new(self.fs.resource(id)) as Box<dyn Resource>)
            .collect())
    }
}

impl MakeCollectionableResource for MemResource {
    fn create_collection(&self, name: &str) -> DavResult<Box<dyn Resource>> {
        let tree = &mut *self.fs.inner.tree.lock();
        let id = tree.add_child(self.id, name, MemFsNode::new_dir())?;
        tree.get_node_mut(self.id)?.update_mtime(SystemTime::now());
        Ok(Box::new(self.fs.resource(id)))
    }
}

impl DeletableResource for MemResource {
    fn delete(&self) -> DavResult<()> {
        {
            let tree = &mut *self.fs.inner.tree.lock();
            let parent = tree.parent(self.id)?;
            tree.delete_node(self.id)?;
            tree.get_node_mut(parent)?.update_mtime(SystemTime::now());
        }
        self.fs.release_locks(&[self.id]);
        Ok(())
    }
}

impl CopyableResource for MemResource {
    fn copy_to(&self, dest: &dyn Resource, name: &str) -> DavResult<()> {
        let dest_id = self.dest_dir(dest)?;
        if let Some(q) = self.fs.inner.quota {
            let size: u64 = {
                let tree = self.fs.inner.tree.lock();
                let mut ids = tree.descendants(self.id);
                ids.push(self.id);
                ids.iter().filter_map(|&i| tree.get_node(i).ok()).map(|n| n.len()).sum()
            };
            if self.fs.used_bytes() + size > q {
                return Err(DavError::InsufficientStorage);
            }
        }
        let tree = &mut *self.fs.inner.tree.lock();
        copy_subtree(tree, self.id, dest_id, name)?;
        tree.get_node_mut(dest_id)?.update_mtime(SystemTime::now());
        Ok(())
    }
}

// copy a node and everything below it; dead properties go along.
fn copy_subtree(tree: &mut Tree, src: u64, dest_parent: u64, name: &str) -> DavResult<()> {
    let node = tree.get_node(src)?.duplicate();
    let children = tree.get_children(src)?;
    let new_id = tree.add_child(dest_parent, name, node)?;
    for c in children {
        // copying a collection into itself stops at the copy.
        if c == new_id {
            continue;
        }
        let cname = tree.name(c)?.to_string();
        copy_subtree(tree, c, new_id, &cname)?;
    }
    Ok(())
}

impl MoveableResource for MemResource {
    fn move_to(&self, dest: &dyn Resource, name: &str) -> DavResult<()> {
        let dest_id = self.dest_dir(dest)?;
        let moved = {
            let tree = &mut *self.fs.inner.tree.lock();
            let old_parent = tree.parent(self.id)?;
            tree.move_node(self.id, dest_id, name)?;
            let now = SystemTime::now();
            tree.get_node_mut(old_parent)?.update_mtime(now);
            tree.get_node_mut(dest_id)?.update_mtime(now);
            let mut ids = tree.descendants(self.id);
            ids.push(self.id);
            ids
        };
        self.fs.release_locks(&moved);
        Ok(())
    }
}

impl LockableResource for MemResource {
    fn lock(&self, timeout: &LockTimeout, info: &LockInfo) -> DavResult<LockResult> {
        Ok(self.fs.inner.ls.lock(timeout, info, &self.fs.unique_id(self.id)))
    }

    fn refresh_lock(&self, token_id: &str) -> DavResult<LockResult> {
        self.fs.inner.ls.refresh(token_id, &self.fs.unique_id(self.id))
    }

    fn unlock(&self, token_id: &str) -> DavResult<()> {
        self.fs.inner.ls.unlock(token_id, &self.fs.unique_id(self.id))
    }

    fn current_lock(&self) -> Option<LockToken> {
        self.fs.inner.ls.current_token(&self.fs.unique_id(self.id))
    }
}

impl LockingCollectionResource for MemResource {
    fn create_and_lock(&self, name: &str, timeout: &LockTimeout, info: &LockInfo) -> DavResult<LockToken> {
        let id = {
            let tree = &mut *self.fs.inner.tree.lock();
            tree.add_child(self.id, name, MemFsNode::new_file(Vec::new(), None))?
        };
        match self.fs.inner.ls.lock(timeout, info, &self.fs.unique_id(id)) {
            LockResult::Success(t) => Ok(t),
            LockResult::Failure(f) => {
                let _ = self.fs.inner.tree.lock().delete_node(id);
                Err(DavError::Status(f.statuscode()))
            }
        }
    }
}

impl PropFindableResource for MemResource {
    fn created(&self) -> Option<SystemTime> {
        self.with_node(|n| n.crtime())
    }
}

impl QuotaResource for MemResource {
    fn quota_used(&self) -> Option<u64> {
        self.fs.inner.quota.map(|_| self.fs.used_bytes())
    }

    fn quota_available(&self) -> Option<u64> {
        let q = self.fs.inner.quota?;
        Some(q.saturating_sub(self.fs.used_bytes()))
    }
}

impl CustomPropertyResource for MemResource {
    fn custom_property_names(&self) -> Vec<QName> {
        self.with_node(|n| n.get_props().keys().cloned().collect())
            .unwrap_or_default()
    }

    fn custom_property(&self, name: &QName) -> Option<Element> {
        self.with_node(|n| n.get_props().get(name).cloned()).flatten()
    }

    fn set_custom_property(&self, name: &QName, value: &Element) -> DavResult<()> {
        self.with_node_mut(|n| {
            n.get_props_mut().insert(name.clone(), value.clone());
            Ok(())
        })
    }

    fn remove_custom_property(&self, name: &QName) -> DavResult<()> {
        self.with_node_mut(|n| {
            n.get_props_mut().remove(name);
            Ok(())
        })
    }
}

impl DigestResource for MemResource {
    fn authenticate_digest(&self, digest: &DigestResponse) -> Option<String> {
        let users = self.fs.inner.users.read();
        let u = users.get(&digest.user)?;
        if digest.verify(&u.password) {
            Some(digest.user.clone())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(fs: &MemFs, path: &str) -> Box<dyn Resource> {
        fs.resolve("localhost", path).unwrap().unwrap()
    }

    #[test]
    fn partial_replace_bounds() {
        let fs = MemFs::new();
        fs.create_file("/x.txt", "hello").unwrap();
        let x = resolve(&fs, "/x.txt");
        let r = x.as_replaceable().unwrap();

        r.replace_partial(3, Bytes::from("p!")).unwrap();
        r.replace_partial(5, Bytes::from("?")).unwrap();
        assert_eq!(fs.read_file("/x.txt").unwrap(), "help!?");

        assert!(r.replace_partial(10, Bytes::from("x")).is_err());
        assert!(r.replace_partial(u64::MAX - 1, Bytes::from("xyz")).is_err());
        assert_eq!(fs.read_file("/x.txt").unwrap(), "help!?");
    }

    #[test]
    fn files_and_dirs() {
        let fs = MemFs::new();
        fs.create_dir("/a").unwrap();
        fs.create_file("/a/x.txt", "hello").unwrap();
        assert!(fs.create_dir("/missing/b").is_err());

        let x = resolve(&fs, "/a/x.txt");
        assert_eq!(x.name(), "x.txt");
        assert_eq!(x.as_getable().unwrap().content().unwrap(), Bytes::from("hello"));
        assert_eq!(x.as_getable().unwrap().content_type(None).unwrap(), "text/plain");
        assert!(x.as_collection().is_none());

        let a = resolve(&fs, "/a");
        let names: Vec<_> = a
            .as_collection()
            .unwrap()
            .children()
            .unwrap()
            .iter()
            .map(|c| c.name())
            .collect();
        assert_eq!(names, vec!["x.txt"]);
        let index = a.as_getable().unwrap().content().unwrap();
        assert!(String::from_utf8_lossy(&index).contains("<a href=\"x.txt\">x.txt</a>"));
    }

    #[test]
    fn copy_and_move() {
        let fs = MemFs::new();
        fs.create_dir("/a").unwrap();
        fs.create_dir("/b").unwrap();
        fs.create_file("/a/x.txt", "data").unwrap();
        let a = resolve(&fs, "/a");
        let b = resolve(&fs, "/b");

        a.as_copyable().unwrap().copy_to(b.as_ref(), "a2").unwrap();
        assert_eq!(fs.read_file("/b/a2/x.txt").unwrap(), Bytes::from("data"));
        assert!(fs.exists("/a/x.txt"));

        let x = resolve(&fs, "/a/x.txt");
        x.as_moveable().unwrap().move_to(b.as_ref(), "y.txt").unwrap();
        assert!(!fs.exists("/a/x.txt"));
        assert_eq!(fs.read_file("/b/y.txt").unwrap(), Bytes::from("data"));
    }

    #[test]
    fn delete_releases_lock() {
        let fs = MemFs::new();
        fs.create_file("/doc.txt", "x").unwrap();
        let doc = resolve(&fs, "/doc.txt");
        let info = LockInfo::exclusive_write(Some("alice"));
        let r = doc.as_lockable().unwrap().lock(&LockTimeout::seconds(60), &info).unwrap();
        assert!(r.is_success());
        assert!(doc.as_lockable().unwrap().current_lock().is_some());
        let uid = doc.unique_id().unwrap();

        doc.as_deletable().unwrap().delete().unwrap();
        assert!(fs.lock_manager().current_token(&uid).is_none());
    }

    #[test]
    fn quota_accounting() {
        let fs = MemFs::with_quota(10);
        fs.create_file("/a", "12345").unwrap();
        let root = resolve(&fs, "/");
        let q = root.as_quota().unwrap();
        assert_eq!(q.quota_used(), Some(5));
        assert_eq!(q.quota_available(), Some(5));
        assert!(MemFs::new().resolve("h", "/").unwrap().unwrap().as_quota().is_none());
    }
}
