// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Creating every pipeline at most once, and remembering pipelines across runs.
//!
//! The [`PipelineStateCache`] maps [`PipelineEntry`] values to [`Pipeline`] objects. A request
//! for an entry that was seen before returns the same `Arc<Pipeline>`; a request for a new entry
//! builds the pipeline layout and the native pipeline synchronously.
//!
//! # Persistence
//!
//! [`save`](PipelineStateCache::save) writes every known entry, the shader bytecode those entries
//! refer to and the driver's pipeline cache blob to one file. [`load`](PipelineStateCache::load)
//! registers the entries of such a file without creating anything: the native pipeline of a
//! loaded entry is only built when the entry is first requested, and the driver blob makes that
//! build cheap. A file that is missing, damaged or written by another version is ignored.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use vulkano_pso::pipeline::{cache::PipelineStateCache, PipelineEntry};
//! # fn example(
//! #     cache: &PipelineStateCache,
//! #     entry: &PipelineEntry,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = cache.get_or_create(entry)?;
//! assert!(Arc::ptr_eq(&pipeline, &cache.get_or_create(entry)?));
//!
//! cache.save("pipelines.bin")?;
//! cache.discard_and_reload_from_disk(&["pipelines.bin"])?;
//! # Ok(())
//! # }
//! ```

use self::file::CacheFileContents;
use super::{
    layout::{PipelineLayout, PipelineLayoutError, PipelineLayoutKey},
    lru::{PipelineLru, PipelineLruCreateInfo},
    Pipeline, PipelineEntry,
};
use crate::{
    cache::OnceCache,
    descriptor_set::{layout::LayoutError, registry::LayoutRegistry},
    device::{ComputePipelineCreateInfo, Device, GraphicsPipelineCreateInfo},
    pipeline::graphics::{GraphicsPipelineDescription, PrimitiveTopology},
    shader::{ShaderCode, ShaderCodeCache, ShaderHash, ShaderStage},
    sync::{
        deferred::{DeferredDeletionQueue, DeferredObject},
        fence::FenceTracker,
    },
    NonExhaustive, VulkanError,
};
use ash::vk;
use foldhash::HashMap;
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use std::{
    collections::{hash_map::Entry, BTreeSet},
    error::Error,
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

pub(crate) mod file;

/// Parameters to create a new `PipelineStateCache`.
#[derive(Clone, Debug)]
pub struct PipelineStateCacheCreateInfo {
    /// The LRU policy for native pipelines, or `None` to keep every native pipeline resident.
    ///
    /// The default value is `None`.
    pub lru: Option<PipelineLruCreateInfo>,

    /// Native pipeline creations that take at least this long are logged as hitches.
    ///
    /// The default value is 10 milliseconds.
    pub hitch_threshold: Duration,

    /// Cache files to [`load`](PipelineStateCache::load) on creation, in priority order.
    ///
    /// The default value is empty.
    pub load_on_create: Vec<PathBuf>,

    /// Whether [`save`](PipelineStateCache::save) compresses the file payload with LZ4. Files
    /// are loaded the same way either way.
    ///
    /// The default value is `true`.
    pub compress_files: bool,

    pub _ne: NonExhaustive,
}

impl Default for PipelineStateCacheCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            lru: None,
            hitch_threshold: Duration::from_millis(10),
            load_on_create: Vec::new(),
            compress_files: true,
            _ne: NonExhaustive(()),
        }
    }
}

/// Counters describing how a `PipelineStateCache` has been used.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineCacheStats {
    /// Requests for an entry that was already known.
    pub hits: u64,

    /// Requests for an entry that was not known.
    pub misses: u64,

    /// Native pipelines that were created.
    pub creations: u64,

    /// Native pipelines that were destroyed by the LRU policy.
    pub evictions: u64,

    /// Native pipelines that were created for an entry loaded from disk.
    pub cold_hits: u64,
}

#[derive(Debug, Default)]
struct StatCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    creations: AtomicU64,
    evictions: AtomicU64,
    cold_hits: AtomicU64,
}

/// Maps pipeline descriptions to pipelines.
#[derive(Debug)]
pub struct PipelineStateCache {
    device: Arc<dyn Device>,
    registry: Arc<LayoutRegistry>,
    deferred: Arc<DeferredDeletionQueue>,
    fences: Arc<FenceTracker>,
    pipelines: RwLock<HashMap<PipelineEntry, Arc<Pipeline>>>,
    layouts: OnceCache<PipelineLayoutKey, Arc<PipelineLayout>>,
    shaders: ShaderCodeCache,
    native_cache: RwLock<vk::PipelineCache>,
    lru: Option<Mutex<PipelineLru>>,
    hitch_threshold: Duration,
    compress_files: bool,
    current_frame: AtomicU64,
    stats: StatCounters,
}

impl PipelineStateCache {
    /// Creates a new `PipelineStateCache`, and loads the files in
    /// [`load_on_create`](PipelineStateCacheCreateInfo::load_on_create).
    pub fn new(
        device: Arc<dyn Device>,
        registry: Arc<LayoutRegistry>,
        deferred: Arc<DeferredDeletionQueue>,
        fences: Arc<FenceTracker>,
        create_info: PipelineStateCacheCreateInfo,
    ) -> Result<Self, VulkanError> {
        let PipelineStateCacheCreateInfo {
            lru,
            hitch_threshold,
            load_on_create,
            compress_files,
            _ne: _,
        } = create_info;

        let native_cache = device.create_pipeline_cache(&[])?;

        let cache = PipelineStateCache {
            device,
            registry,
            deferred,
            fences,
            pipelines: RwLock::new(HashMap::default()),
            layouts: OnceCache::new(),
            shaders: ShaderCodeCache::default(),
            native_cache: RwLock::new(native_cache),
            lru: lru.as_ref().map(|create_info| Mutex::new(PipelineLru::new(create_info))),
            hitch_threshold,
            compress_files,
            current_frame: AtomicU64::new(0),
            stats: StatCounters::default(),
        };

        if !load_on_create.is_empty() {
            cache.load(&load_on_create);
        }

        Ok(cache)
    }

    /// Makes shader bytecode available to pipelines that refer to its hash. Registering the same
    /// bytecode again, even from a different source, has no effect.
    #[inline]
    pub fn register_shader(&self, code: ShaderCode) -> ShaderHash {
        self.shaders.insert(code).hash()
    }

    /// Returns the pipeline for `entry`, creating it if it doesn't exist yet.
    ///
    /// The returned pipeline always has a native object. If the entry is known but its native
    /// pipeline was evicted or never created (because the entry was loaded from disk), the
    /// native pipeline is created before returning.
    pub fn get_or_create(
        &self,
        entry: &PipelineEntry,
    ) -> Result<Arc<Pipeline>, PipelineCacheError> {
        let existing = self.pipelines.read().get(entry).cloned();

        let (pipeline, inserted) = match existing {
            Some(pipeline) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                log::trace!("pipeline cache hit for pipeline {}", pipeline.id());

                (pipeline, false)
            }
            None => {
                self.validate_entry(entry)?;

                match self.pipelines.write().entry(entry.clone()) {
                    Entry::Occupied(slot) => {
                        self.stats.hits.fetch_add(1, Ordering::Relaxed);

                        (slot.get().clone(), false)
                    }
                    Entry::Vacant(slot) => {
                        self.stats.misses.fetch_add(1, Ordering::Relaxed);
                        let pipeline = Arc::new(Pipeline::new(
                            entry.clone(),
                            false,
                            self.deferred.clone(),
                        ));
                        log::debug!(
                            "pipeline cache miss, new {:?} pipeline {}",
                            entry.bind_point(),
                            pipeline.id(),
                        );

                        (slot.insert(pipeline).clone(), true)
                    }
                }
            }
        };

        if let Err(err) = self.ensure_native(&pipeline, None) {
            if inserted {
                let mut pipelines = self.pipelines.write();

                if pipelines
                    .get(entry)
                    .is_some_and(|stored| Arc::ptr_eq(stored, &pipeline))
                {
                    pipelines.remove(entry);
                }
            }

            return Err(err);
        }

        Ok(pipeline)
    }

    /// Returns the native pipeline of `pipeline`, recreating it if it was evicted, and records
    /// that the command buffer with `fence_value` uses it.
    ///
    /// This works for any pipeline created by this cache, including one that was dropped from
    /// the cache by [`rebuild_from_scratch`](Self::rebuild_from_scratch) but is still held
    /// elsewhere.
    pub fn use_pipeline(
        &self,
        pipeline: &Arc<Pipeline>,
        fence_value: u64,
    ) -> Result<vk::Pipeline, PipelineCacheError> {
        self.ensure_native(pipeline, Some(fence_value))
            .map(|(handle, _)| handle)
    }

    /// Like [`use_pipeline`](Self::use_pipeline), but also returns the layout.
    pub(crate) fn use_pipeline_with_layout(
        &self,
        pipeline: &Arc<Pipeline>,
        fence_value: u64,
    ) -> Result<(vk::Pipeline, Arc<PipelineLayout>), PipelineCacheError> {
        self.ensure_native(pipeline, Some(fence_value))
    }

    /// Returns the layout of `pipeline` without creating the native pipeline.
    pub(crate) fn layout_of(
        &self,
        pipeline: &Pipeline,
    ) -> Result<Arc<PipelineLayout>, PipelineCacheError> {
        match pipeline.layout() {
            Some(layout) => Ok(layout),
            None => self.pipeline_layout(pipeline.entry()),
        }
    }

    fn ensure_native(
        &self,
        pipeline: &Arc<Pipeline>,
        usage: Option<u64>,
    ) -> Result<(vk::Pipeline, Arc<PipelineLayout>), PipelineCacheError> {
        let mut state = pipeline.state.lock();

        let resident = match (state.handle, state.layout.clone()) {
            (Some(handle), Some(layout)) => (handle, layout),
            (_, layout) => {
                let cold = pipeline.is_from_disk() && layout.is_none();
                let layout = match layout {
                    Some(layout) => layout,
                    None => self.pipeline_layout(pipeline.entry())?,
                };

                let start = Instant::now();
                let handle = self.create_native(pipeline.entry(), &layout)?;
                let elapsed = start.elapsed();

                self.stats.creations.fetch_add(1, Ordering::Relaxed);
                if cold {
                    self.stats.cold_hits.fetch_add(1, Ordering::Relaxed);
                }

                if elapsed >= self.hitch_threshold {
                    log::debug!(
                        "hitch: creating {:?} pipeline {} took {:?}",
                        pipeline.bind_point(),
                        pipeline.id(),
                        elapsed,
                    );
                } else {
                    log::debug!(
                        "created {:?} pipeline {} in {:?}",
                        pipeline.bind_point(),
                        pipeline.id(),
                        elapsed,
                    );
                }

                state.size = self.device.estimate_pipeline_size(handle);
                state.handle = Some(handle);
                state.layout = Some(layout.clone());

                (handle, layout)
            }
        };

        if let Some(fence_value) = usage {
            pipeline.mark_used(fence_value, self.current_frame.load(Ordering::Relaxed));
        }

        drop(state);

        if let Some(lru) = &self.lru {
            let mut lru = lru.lock();
            let mut state = pipeline.state.lock();
            lru.touch(pipeline, &mut state);
        }

        Ok(resident)
    }

    fn pipeline_layout(
        &self,
        entry: &PipelineEntry,
    ) -> Result<Arc<PipelineLayout>, PipelineCacheError> {
        let key = PipelineLayoutKey::new(entry.stages());

        self.layouts.get_or_try_insert(&key, || {
            let layout = PipelineLayout::new(
                &*self.device,
                &self.registry,
                entry.stages(),
                self.deferred.clone(),
                self.fences.clone(),
            )?;

            Ok((key.clone(), Arc::new(layout)))
        })
    }

    fn create_native(
        &self,
        entry: &PipelineEntry,
        layout: &PipelineLayout,
    ) -> Result<vk::Pipeline, PipelineCacheError> {
        let mut modules: SmallVec<[(ShaderStage, vk::ShaderModule); 5]> = SmallVec::new();

        let result = (|| -> Result<vk::Pipeline, PipelineCacheError> {
            for stage in entry.stages() {
                let code = self
                    .shaders
                    .get(stage.code)
                    .ok_or(PipelineCacheError::MissingShaderCode(stage.code))?;
                modules.push((stage.stage, self.device.create_shader_module(&code)?));
            }

            let native_cache = self.native_cache.read();

            let handle = match entry {
                PipelineEntry::Graphics(description) => unsafe {
                    self.device.create_graphics_pipeline(
                        *native_cache,
                        &GraphicsPipelineCreateInfo {
                            layout: layout.handle(),
                            stages: &modules,
                            description,
                        },
                    )
                },
                PipelineEntry::Compute(_) => unsafe {
                    self.device.create_compute_pipeline(
                        *native_cache,
                        &ComputePipelineCreateInfo {
                            layout: layout.handle(),
                            module: modules[0].1,
                        },
                    )
                },
            }?;

            Ok(handle)
        })();

        // Pipelines don't keep their shader modules alive.
        for (_, module) in modules {
            unsafe { self.device.destroy_shader_module(module) };
        }

        result
    }

    fn validate_entry(&self, entry: &PipelineEntry) -> Result<(), PipelineCacheError> {
        match entry {
            PipelineEntry::Graphics(description) => validate_graphics(description)?,
            PipelineEntry::Compute(description) => {
                if description.stage.stage != ShaderStage::Compute {
                    return Err(PipelineCacheError::InvalidEntry(
                        "the stage of a compute pipeline must be `ShaderStage::Compute`",
                    ));
                }
            }
        }

        for hash in entry.shader_hashes() {
            if self.shaders.get(hash).is_none() {
                return Err(PipelineCacheError::MissingShaderCode(hash));
            }
        }

        Ok(())
    }

    /// Returns whether `entry` is known, with or without a native pipeline.
    #[inline]
    pub fn contains(&self, entry: &PipelineEntry) -> bool {
        self.pipelines.read().contains_key(entry)
    }

    /// Returns the number of known entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.pipelines.read().len()
    }

    /// Returns the number of known entries that currently have a native pipeline.
    pub fn resident_count(&self) -> usize {
        self.pipelines
            .read()
            .values()
            .filter(|pipeline| pipeline.handle().is_some())
            .count()
    }

    #[inline]
    pub fn stats(&self) -> PipelineCacheStats {
        PipelineCacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            creations: self.stats.creations.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            cold_hits: self.stats.cold_hits.load(Ordering::Relaxed),
        }
    }

    /// Applies the LRU policy against `completed_fence` and advances the frame counter. Returns
    /// the number of evicted native pipelines.
    pub fn end_frame(&self, completed_fence: u64) -> usize {
        let frame = self.current_frame.fetch_add(1, Ordering::Relaxed);

        let evicted = match &self.lru {
            Some(lru) => lru.lock().evict(completed_fence, frame, &self.deferred),
            None => 0,
        };
        self.stats
            .evictions
            .fetch_add(evicted as u64, Ordering::Relaxed);

        evicted
    }

    /// Writes every known entry to `path`, replacing the file if it exists. Returns the number
    /// of written entries.
    ///
    /// Entries whose layouts use immutable samplers are skipped, as samplers only exist at
    /// runtime.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<usize, PipelineCacheError> {
        let path = path.as_ref();
        let entries: Vec<PipelineEntry> = self
            .pipelines
            .read()
            .keys()
            .filter(|entry| entry.is_persistable())
            .cloned()
            .collect();

        let hashes: BTreeSet<ShaderHash> =
            entries.iter().flat_map(|entry| entry.shader_hashes()).collect();
        let shaders = hashes
            .into_iter()
            .filter_map(|hash| self.shaders.get(hash))
            .map(|code| (code.hash(), code.words().to_vec()))
            .collect::<Vec<_>>();

        let driver_cache = unsafe { self.device.pipeline_cache_data(*self.native_cache.read()) }?;

        let mut contents = CacheFileContents {
            shaders,
            driver_cache,
            ..Default::default()
        };
        let count = entries.len();

        for entry in entries {
            match entry {
                PipelineEntry::Graphics(description) => contents.graphics.push(description),
                PipelineEntry::Compute(description) => contents.compute.push(description),
            }
        }

        let bytes = file::encode(&contents, self.compress_files)
            .map_err(|err| PipelineCacheError::Serialization(err.to_string()))?;

        if let Err(err) = file::write_atomically(path, &bytes) {
            log::warn!("failed to save the pipeline cache to {}: {}", path.display(), err);

            return Err(PipelineCacheError::Io {
                path: path.to_owned(),
                kind: err.kind(),
            });
        }

        log::info!(
            "saved {} pipelines and {} shaders ({} bytes) to {}",
            count,
            contents.shaders.len(),
            bytes.len(),
            path.display(),
        );

        Ok(count)
    }

    /// Registers the entries of the first valid cache file among `paths`, without creating any
    /// native pipeline. Returns the number of newly registered entries.
    ///
    /// Files that are missing or rejected are skipped. If no file is valid, nothing happens.
    pub fn load(&self, paths: &[impl AsRef<Path>]) -> usize {
        for path in paths {
            let path = path.as_ref();

            let bytes = match fs::read(path) {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    log::debug!("no pipeline cache at {}", path.display());
                    continue;
                }
                Err(err) => {
                    log::warn!("failed to read pipeline cache {}: {}", path.display(), err);
                    continue;
                }
            };

            match file::decode(&bytes) {
                Ok(contents) => return self.merge_loaded(contents, path),
                Err(err) => {
                    log::warn!("ignoring pipeline cache {}: {}", path.display(), err);
                }
            }
        }

        0
    }

    fn merge_loaded(&self, contents: CacheFileContents, path: &Path) -> usize {
        for code in contents.shader_codes() {
            self.shaders.insert(code);
        }

        let CacheFileContents {
            graphics,
            compute,
            driver_cache,
            ..
        } = contents;

        let entries = graphics
            .into_iter()
            .map(PipelineEntry::Graphics)
            .chain(compute.into_iter().map(PipelineEntry::Compute));
        let mut added = 0;
        let mut rejected = 0;

        {
            let mut pipelines = self.pipelines.write();

            for entry in entries {
                if self.validate_entry(&entry).is_err() {
                    rejected += 1;
                    continue;
                }

                if let Entry::Vacant(slot) = pipelines.entry(entry) {
                    let pipeline = Pipeline::new(slot.key().clone(), true, self.deferred.clone());
                    slot.insert(Arc::new(pipeline));
                    added += 1;
                }
            }
        }

        if rejected != 0 {
            log::warn!(
                "skipped {} invalid pipelines in {}",
                rejected,
                path.display(),
            );
        }

        self.merge_driver_cache(&driver_cache, path);

        log::info!(
            "loaded {} pipelines from {}, {} pipelines known",
            added,
            path.display(),
            self.len(),
        );

        added
    }

    fn merge_driver_cache(&self, data: &[u8], path: &Path) {
        if data.is_empty() {
            return;
        }

        if !file::driver_cache_matches(self.device.properties(), data) {
            log::warn!(
                "ignoring the driver pipeline cache in {}, it was created by another device or \
                driver",
                path.display(),
            );

            return;
        }

        let result = self.device.create_pipeline_cache(data).and_then(|loaded| {
            let native_cache = self.native_cache.read();
            let result = unsafe { self.device.merge_pipeline_caches(*native_cache, &[loaded]) };
            unsafe { self.device.destroy_pipeline_cache(loaded) };

            result
        });

        if let Err(err) = result {
            log::warn!(
                "failed to merge the driver pipeline cache in {}: {}",
                path.display(),
                err,
            );
        }
    }

    /// Forgets every entry, whether requested in this run or loaded from disk, and starts over
    /// with an empty driver pipeline cache.
    ///
    /// Native pipelines are destroyed through the deferred deletion queue once nothing holds
    /// their `Pipeline` anymore. Pipelines still held elsewhere stay valid, but are no longer
    /// returned by [`get_or_create`](Self::get_or_create).
    pub fn rebuild_from_scratch(&self) -> Result<(), VulkanError> {
        let new_cache = self.device.create_pipeline_cache(&[])?;

        let pipelines: Vec<_> = self.pipelines.write().drain().map(|(_, p)| p).collect();
        if let Some(lru) = &self.lru {
            lru.lock().clear();
        }
        let layouts = self.layouts.drain();

        let old_cache = std::mem::replace(&mut *self.native_cache.write(), new_cache);
        // Command buffers never reference a pipeline cache.
        self.deferred.push(DeferredObject::PipelineCache(old_cache), 0);

        log::info!(
            "discarded {} pipelines and {} pipeline layouts",
            pipelines.len(),
            layouts.len(),
        );

        Ok(())
    }

    /// Calls [`rebuild_from_scratch`](Self::rebuild_from_scratch), then [`load`](Self::load).
    /// Returns the number of loaded entries.
    pub fn discard_and_reload_from_disk(
        &self,
        paths: &[impl AsRef<Path>],
    ) -> Result<usize, VulkanError> {
        self.rebuild_from_scratch()?;

        Ok(self.load(paths))
    }
}

impl Drop for PipelineStateCache {
    fn drop(&mut self) {
        unsafe {
            self.device
                .destroy_pipeline_cache(*self.native_cache.get_mut())
        };
    }
}

fn validate_graphics(description: &GraphicsPipelineDescription) -> Result<(), PipelineCacheError> {
    let count = |stage: ShaderStage| {
        description
            .stages
            .iter()
            .filter(|s| s.stage == stage)
            .count()
    };

    if count(ShaderStage::Vertex) != 1 {
        return Err(PipelineCacheError::InvalidEntry(
            "a graphics pipeline must have exactly one vertex stage",
        ));
    }

    if count(ShaderStage::Compute) != 0 {
        return Err(PipelineCacheError::InvalidEntry(
            "a graphics pipeline cannot have a compute stage",
        ));
    }

    if description.color_blend.len() != description.render_targets.color_formats.len() {
        return Err(PipelineCacheError::InvalidEntry(
            "a graphics pipeline must have one color blend attachment per color format",
        ));
    }

    let tessellation = count(ShaderStage::TessellationControl) != 0
        || count(ShaderStage::TessellationEvaluation) != 0;

    if tessellation != (description.input_assembly.topology == PrimitiveTopology::PatchList) {
        return Err(PipelineCacheError::InvalidEntry(
            "the patch list topology must be used exactly when tessellation stages are present",
        ));
    }

    Ok(())
}

/// Error that can happen when using a `PipelineStateCache`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineCacheError {
    /// The entry describes a pipeline that cannot exist.
    InvalidEntry(&'static str),

    /// No bytecode was registered for a shader the entry refers to.
    MissingShaderCode(ShaderHash),

    /// The shader bindings of the entry could not be merged into a layout.
    Layout(LayoutError),

    /// The cache file could not be written.
    Io { path: PathBuf, kind: io::ErrorKind },

    /// The cache contents could not be serialized.
    Serialization(String),

    /// The device failed to create a native object.
    VulkanError(VulkanError),
}

impl Error for PipelineCacheError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Layout(err) => Some(err),
            Self::VulkanError(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for PipelineCacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEntry(problem) => write!(f, "invalid pipeline entry: {}", problem),
            Self::MissingShaderCode(hash) => {
                write!(f, "no bytecode was registered for shader {}", hash)
            }
            Self::Layout(_) => write!(f, "the shader bindings could not be merged into a layout"),
            Self::Io { path, kind } => write!(
                f,
                "the pipeline cache could not be written to {}: {}",
                path.display(),
                io::Error::from(*kind),
            ),
            Self::Serialization(message) => {
                write!(f, "the pipeline cache could not be serialized: {}", message)
            }
            Self::VulkanError(_) => write!(f, "a runtime error occurred"),
        }
    }
}

impl From<LayoutError> for PipelineCacheError {
    #[inline]
    fn from(err: LayoutError) -> Self {
        Self::Layout(err)
    }
}

impl From<VulkanError> for PipelineCacheError {
    #[inline]
    fn from(err: VulkanError) -> Self {
        Self::VulkanError(err)
    }
}

impl From<PipelineLayoutError> for PipelineCacheError {
    #[inline]
    fn from(err: PipelineLayoutError) -> Self {
        match err {
            PipelineLayoutError::Layout(err) => Self::Layout(err),
            PipelineLayoutError::VulkanError(err) => Self::VulkanError(err),
        }
    }
}
