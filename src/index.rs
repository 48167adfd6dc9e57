// Genome index handling: on-disk load, the in-process cache, and the
// provider seam the orchestrator consumes.
//
// An index directory holds two files: `genome.idx` with the metadata the
// core needs (seed length, base count, contig table) and `seeds.tbl`, the
// seed lookup table. The table is opaque to the orchestration layer; it is
// either read into memory or memory-mapped, and handed to the search engine
// as raw bytes.

use anyhow::{bail, Context, Result};
use memmap2::{Advice, Mmap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Index-directory value meaning "no alignment, input/output only".
pub const NO_INDEX_MARKER: &str = "-";

const METADATA_FILE: &str = "genome.idx";
const SEED_TABLE_FILE: &str = "seeds.tbl";
const INDEX_MAGIC: u32 = 0x4749_4458; // "GIDX"
const INDEX_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMapMode {
    /// Read the seed table into anonymous memory.
    Load,
    /// Map the seed table file and let the OS page it in.
    MemoryMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchMode {
    Off,
    WillNeed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contig {
    pub name: String,
    pub length: u64,
}

#[derive(Debug, Clone)]
pub struct Genome {
    pub base_count: u64,
    pub contigs: Vec<Contig>,
}

#[derive(Debug)]
enum SeedTable {
    InMemory(Vec<u8>),
    Mapped(Mmap),
}

impl SeedTable {
    fn bytes(&self) -> &[u8] {
        match self {
            SeedTable::InMemory(v) => v,
            SeedTable::Mapped(m) => m,
        }
    }
}

/// A loaded genome index. Immutable after load; shared read-only across all
/// worker threads for the duration of a run.
#[derive(Debug)]
pub struct GenomeIndex {
    genome: Genome,
    seed_length: u32,
    seeds: SeedTable,
}

impl GenomeIndex {
    pub fn genome(&self) -> &Genome {
        &self.genome
    }

    pub fn seed_length(&self) -> u32 {
        self.seed_length
    }

    /// The raw seed lookup table, for the search engine.
    pub fn seed_table(&self) -> &[u8] {
        self.seeds.bytes()
    }

    pub fn in_memory(genome: Genome, seed_length: u32, seeds: Vec<u8>) -> Self {
        GenomeIndex {
            genome,
            seed_length,
            seeds: SeedTable::InMemory(seeds),
        }
    }

    /// Load an index from `directory`.
    pub fn load_from_directory(
        directory: &Path,
        map_mode: IndexMapMode,
        prefetch: PrefetchMode,
    ) -> Result<Self> {
        let metadata_path = directory.join(METADATA_FILE);
        let mut meta = BufReader::new(
            File::open(&metadata_path)
                .with_context(|| format!("cannot open index metadata '{}'", metadata_path.display()))?,
        );

        let mut buf_u32 = [0u8; 4];
        let mut buf_u64 = [0u8; 8];

        meta.read_exact(&mut buf_u32)?;
        if u32::from_le_bytes(buf_u32) != INDEX_MAGIC {
            bail!("'{}' is not a genome index", metadata_path.display());
        }
        meta.read_exact(&mut buf_u32)?;
        let version = u32::from_le_bytes(buf_u32);
        if version != INDEX_VERSION {
            bail!(
                "index version {} in '{}' is not supported (expected {})",
                version,
                metadata_path.display(),
                INDEX_VERSION
            );
        }

        meta.read_exact(&mut buf_u32)?;
        let seed_length = u32::from_le_bytes(buf_u32);
        meta.read_exact(&mut buf_u64)?;
        let base_count = u64::from_le_bytes(buf_u64);

        meta.read_exact(&mut buf_u32)?;
        let n_contigs = u32::from_le_bytes(buf_u32);
        let mut contigs = Vec::with_capacity(n_contigs as usize);
        for _ in 0..n_contigs {
            let mut buf_u16 = [0u8; 2];
            meta.read_exact(&mut buf_u16)?;
            let name_len = u16::from_le_bytes(buf_u16) as usize;
            let mut name_bytes = vec![0u8; name_len];
            meta.read_exact(&mut name_bytes)?;
            let name = String::from_utf8(name_bytes)
                .with_context(|| format!("malformed contig name in '{}'", metadata_path.display()))?;
            meta.read_exact(&mut buf_u64)?;
            contigs.push(Contig {
                name,
                length: u64::from_le_bytes(buf_u64),
            });
        }

        let table_path = directory.join(SEED_TABLE_FILE);
        let table_file = File::open(&table_path)
            .with_context(|| format!("cannot open seed table '{}'", table_path.display()))?;
        let seeds = match map_mode {
            IndexMapMode::MemoryMap => {
                let mmap = unsafe { Mmap::map(&table_file) }
                    .with_context(|| format!("cannot map seed table '{}'", table_path.display()))?;
                if prefetch == PrefetchMode::WillNeed {
                    // Advisory only; an index larger than memory still works.
                    let _ = mmap.advise(Advice::WillNeed);
                }
                SeedTable::Mapped(mmap)
            }
            IndexMapMode::Load => {
                let mut bytes = Vec::new();
                BufReader::new(table_file).read_to_end(&mut bytes)?;
                SeedTable::InMemory(bytes)
            }
        };

        Ok(GenomeIndex {
            genome: Genome { base_count, contigs },
            seed_length,
            seeds,
        })
    }

    /// Write this index into `directory` in the format `load_from_directory`
    /// reads.
    pub fn dump_to_directory(&self, directory: &Path) -> Result<()> {
        std::fs::create_dir_all(directory)?;

        let metadata_path = directory.join(METADATA_FILE);
        let mut meta = BufWriter::new(File::create(&metadata_path)?);
        meta.write_all(&INDEX_MAGIC.to_le_bytes())?;
        meta.write_all(&INDEX_VERSION.to_le_bytes())?;
        meta.write_all(&self.seed_length.to_le_bytes())?;
        meta.write_all(&self.genome.base_count.to_le_bytes())?;
        meta.write_all(&(self.genome.contigs.len() as u32).to_le_bytes())?;
        for contig in &self.genome.contigs {
            meta.write_all(&(contig.name.len() as u16).to_le_bytes())?;
            meta.write_all(contig.name.as_bytes())?;
            meta.write_all(&contig.length.to_le_bytes())?;
        }
        meta.flush()?;

        let table_path = directory.join(SEED_TABLE_FILE);
        let mut table = BufWriter::new(File::create(&table_path)?);
        table.write_all(self.seeds.bytes())?;
        table.flush()?;
        Ok(())
    }
}

/// Loads indexes on behalf of the cache.
pub trait IndexProvider {
    fn load(
        &self,
        directory: &Path,
        map_mode: IndexMapMode,
        prefetch: PrefetchMode,
    ) -> Result<GenomeIndex>;
}

pub struct DirectoryIndexProvider;

impl IndexProvider for DirectoryIndexProvider {
    fn load(
        &self,
        directory: &Path,
        map_mode: IndexMapMode,
        prefetch: PrefetchMode,
    ) -> Result<GenomeIndex> {
        GenomeIndex::load_from_directory(directory, map_mode, prefetch)
    }
}

/// In-process index cache: at most one resident index.
///
/// Re-acquiring the resident directory returns the existing handle with no
/// I/O, which is what makes repeated runs in one process cheap; a directory
/// change discards the old index exactly once before the new one is loaded.
/// The cache is only mutated at run initialization — concurrent
/// initializations in one process are the caller's problem to serialize.
pub struct IndexCache {
    provider: Box<dyn IndexProvider>,
    directory: Option<String>,
    index: Option<Arc<GenomeIndex>>,
}

impl IndexCache {
    pub fn new(provider: Box<dyn IndexProvider>) -> Self {
        IndexCache {
            provider,
            directory: None,
            index: None,
        }
    }

    /// Resident directory, if any (the no-index marker counts as resident).
    pub fn resident_directory(&self) -> Option<&str> {
        self.directory.as_deref()
    }

    /// Return a handle for `directory`, reusing the resident index when the
    /// directory is unchanged. `None` means an input/output-only run.
    pub fn acquire(
        &mut self,
        directory: &str,
        map_mode: IndexMapMode,
        prefetch: PrefetchMode,
    ) -> Result<Option<Arc<GenomeIndex>>> {
        if self.directory.as_deref() == Some(directory) {
            return Ok(self.index.clone());
        }

        // Discard the previous index before loading the new one, so two
        // multi-gigabyte indexes are never resident at once.
        self.index = None;
        self.directory = None;

        if directory == NO_INDEX_MARKER {
            log::info!("no alignment, input/output only");
            self.directory = Some(directory.to_string());
            return Ok(None);
        }

        log::info!("Loading index from {}...", directory);
        let load_start = Instant::now();
        let index = self
            .provider
            .load(Path::new(directory), map_mode, prefetch)
            .with_context(|| format!("index load failed for '{}'", directory))?;
        log::info!(
            "{:.1}s. {} bases, seed size {}",
            load_start.elapsed().as_secs_f64(),
            index.genome().base_count,
            index.seed_length()
        );

        let handle = Arc::new(index);
        self.directory = Some(directory.to_string());
        self.index = Some(Arc::clone(&handle));
        Ok(Some(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn small_index() -> GenomeIndex {
        GenomeIndex::in_memory(
            Genome {
                base_count: 48,
                contigs: vec![
                    Contig { name: "chr1".to_string(), length: 32 },
                    Contig { name: "chr2".to_string(), length: 16 },
                ],
            },
            20,
            vec![0xAB; 256],
        )
    }

    #[test]
    fn test_dump_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        small_index().dump_to_directory(dir.path()).unwrap();

        let loaded =
            GenomeIndex::load_from_directory(dir.path(), IndexMapMode::Load, PrefetchMode::Off)
                .unwrap();
        assert_eq!(loaded.seed_length(), 20);
        assert_eq!(loaded.genome().base_count, 48);
        assert_eq!(loaded.genome().contigs.len(), 2);
        assert_eq!(loaded.genome().contigs[0].name, "chr1");
        assert_eq!(loaded.seed_table(), &[0xAB; 256][..]);
    }

    #[test]
    fn test_mapped_load_matches_in_memory_load() {
        let dir = tempfile::tempdir().unwrap();
        small_index().dump_to_directory(dir.path()).unwrap();

        let mapped = GenomeIndex::load_from_directory(
            dir.path(),
            IndexMapMode::MemoryMap,
            PrefetchMode::WillNeed,
        )
        .unwrap();
        let loaded =
            GenomeIndex::load_from_directory(dir.path(), IndexMapMode::Load, PrefetchMode::Off)
                .unwrap();
        assert_eq!(mapped.seed_table(), loaded.seed_table());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(METADATA_FILE), b"not an index").unwrap();
        std::fs::write(dir.path().join(SEED_TABLE_FILE), b"").unwrap();
        let err =
            GenomeIndex::load_from_directory(dir.path(), IndexMapMode::Load, PrefetchMode::Off)
                .unwrap_err();
        assert!(err.to_string().contains("not a genome index"));
    }

    struct CountingProvider {
        loads: Rc<Cell<usize>>,
    }

    impl IndexProvider for CountingProvider {
        fn load(&self, _: &Path, _: IndexMapMode, _: PrefetchMode) -> Result<GenomeIndex> {
            self.loads.set(self.loads.get() + 1);
            Ok(small_index())
        }
    }

    fn counting_cache() -> (IndexCache, Rc<Cell<usize>>) {
        let loads = Rc::new(Cell::new(0));
        let cache = IndexCache::new(Box::new(CountingProvider { loads: Rc::clone(&loads) }));
        (cache, loads)
    }

    #[test]
    fn test_acquire_same_directory_reuses_handle() {
        let (mut cache, loads) = counting_cache();
        let a = cache
            .acquire("idx-a", IndexMapMode::Load, PrefetchMode::Off)
            .unwrap()
            .unwrap();
        let b = cache
            .acquire("idx-a", IndexMapMode::Load, PrefetchMode::Off)
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        // One load despite two acquires of the same directory.
        assert_eq!(loads.get(), 1);

        cache.acquire("idx-b", IndexMapMode::Load, PrefetchMode::Off).unwrap();
        assert_eq!(loads.get(), 2);
    }

    #[test]
    fn test_directory_change_evicts_previous_handle() {
        let (mut cache, _loads) = counting_cache();
        let a = cache
            .acquire("idx-a", IndexMapMode::Load, PrefetchMode::Off)
            .unwrap()
            .unwrap();
        let weak_a = Arc::downgrade(&a);
        drop(a);
        assert!(weak_a.upgrade().is_some(), "cache keeps the resident index alive");

        let b = cache
            .acquire("idx-b", IndexMapMode::Load, PrefetchMode::Off)
            .unwrap()
            .unwrap();
        assert!(weak_a.upgrade().is_none(), "old index released exactly once");
        assert_eq!(cache.resident_directory(), Some("idx-b"));
        drop(b);
    }

    #[test]
    fn test_no_index_marker_yields_null_handle() {
        let (mut cache, loads) = counting_cache();

        let handle = cache
            .acquire(NO_INDEX_MARKER, IndexMapMode::Load, PrefetchMode::Off)
            .unwrap();
        assert!(handle.is_none());
        assert_eq!(loads.get(), 0);

        // The marker is itself cached: acquiring it again stays a no-op.
        let again = cache
            .acquire(NO_INDEX_MARKER, IndexMapMode::Load, PrefetchMode::Off)
            .unwrap();
        assert!(again.is_none());
        assert_eq!(loads.get(), 0);
    }

    #[test]
    fn test_failed_load_leaves_cache_empty() {
        struct FailingProvider;
        impl IndexProvider for FailingProvider {
            fn load(&self, _: &Path, _: IndexMapMode, _: PrefetchMode) -> Result<GenomeIndex> {
                bail!("disk on fire")
            }
        }
        let mut cache = IndexCache::new(Box::new(FailingProvider));
        assert!(cache.acquire("idx-a", IndexMapMode::Load, PrefetchMode::Off).is_err());
        assert_eq!(cache.resident_directory(), None);
    }
}
