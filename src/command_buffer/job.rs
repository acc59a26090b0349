//! Jobs and job chains.
//!
//! A [`Job`] is a payload waiting to be written into descriptor memory. Once allocated, it is added to a
//! [`JobChain`], which assigns it an index and wires its dependencies. Chains are linked (every header gets the
//! address of the next job) only when their batch is closed, so adding jobs never has to touch earlier ones.

use anyhow::Result;

use crate::allocator::arena::{ArenaPool, PoolPtr};
use crate::allocator::traits::SlabAllocator;
use crate::command_buffer::packed::{
    ComputeJobPayload, FragmentJobPayload, JobHeader, JobType, TilerJobPayload, JOB_ALIGN, JOB_BARRIER,
    JOB_HEADER_SIZE,
};

/// A hardware job, before it is written into descriptor memory.
#[derive(Debug, Clone)]
pub enum Job {
    /// Placeholder doing nothing.
    Null,
    /// Vertex shading for one draw.
    Vertex(ComputeJobPayload),
    /// Primitive binning for one draw.
    Tiler(TilerJobPayload),
    /// One dispatch.
    Compute(ComputeJobPayload),
    /// Fragment shading of one framebuffer layer.
    Fragment(FragmentJobPayload),
}

impl Job {
    /// Hardware type of this job.
    pub fn job_type(&self) -> JobType {
        match self {
            Job::Null => JobType::Null,
            Job::Vertex(_) => JobType::Vertex,
            Job::Tiler(_) => JobType::Tiler,
            Job::Compute(_) => JobType::Compute,
            Job::Fragment(_) => JobType::Fragment,
        }
    }

    fn payload(&self) -> &[u8] {
        match self {
            Job::Null => &[],
            Job::Vertex(payload) | Job::Compute(payload) => bytemuck::bytes_of(payload),
            Job::Tiler(payload) => bytemuck::bytes_of(payload),
            Job::Fragment(payload) => bytemuck::bytes_of(payload),
        }
    }

    /// Allocate room for the header and payload of this job and write the payload. The header is written when
    /// the job is added to a chain.
    /// # Errors
    /// * Fails with [`Error::OutOfMemory`](crate::Error::OutOfMemory) if the pool cannot grow.
    pub fn allocate<A: SlabAllocator>(&self, pool: &mut ArenaPool<A>) -> Result<AllocatedJob> {
        let payload = self.payload();
        let ptr = pool.allocate(JOB_HEADER_SIZE + payload.len() as u64, JOB_ALIGN)?;
        pool.write(&ptr, JOB_HEADER_SIZE, payload);
        Ok(AllocatedJob {
            ty: self.job_type(),
            ptr,
        })
    }
}

/// A job written into descriptor memory but not part of any chain yet.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AllocatedJob {
    /// Hardware type of the job.
    pub ty: JobType,
    /// Location of the job header.
    pub ptr: PoolPtr,
}

/// Bookkeeping for one job of a chain.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct JobRecord {
    /// Hardware type.
    pub ty: JobType,
    /// Index in the chain, starting at one.
    pub index: u16,
    /// Location of the job header.
    pub ptr: PoolPtr,
    /// Indices of the jobs this one waits for, zero for none.
    pub dependencies: [u16; 2],
    /// Header as last written to descriptor memory.
    pub header: JobHeader,
}

impl JobRecord {
    /// GPU address of the job header.
    pub fn address(&self) -> u64 {
        self.ptr.gpu
    }

    /// Whether this job waits for the job with index `index`.
    pub fn depends_on(&self, index: u16) -> bool {
        index != 0 && self.dependencies.contains(&index)
    }
}

/// An ordered list of jobs with explicit dependency edges.
///
/// Every tiler job depends on the previous tiler job of the chain, so primitives are binned in draw order.
#[derive(Debug, Default, Clone)]
pub struct JobChain {
    jobs: Vec<JobRecord>,
    job_index: u16,
    prev_tiler: u16,
    first_tiler: Option<u64>,
}

impl JobChain {
    /// Add an allocated job to the chain and write its header. `local_dep` is the index of a job this one must
    /// wait for, zero for none.
    ///
    /// Returns the index of the new job.
    pub fn add<A: SlabAllocator>(
        &mut self,
        pool: &mut ArenaPool<A>,
        job: AllocatedJob,
        local_dep: u16,
        barrier: bool,
    ) -> u16 {
        self.job_index += 1;
        let index = self.job_index;

        let global_dep = if job.ty == JobType::Tiler {
            let prev = self.prev_tiler;
            self.prev_tiler = index;
            if self.first_tiler.is_none() {
                self.first_tiler = Some(job.ptr.gpu);
            }
            prev
        } else {
            0
        };

        let header = JobHeader {
            job_type: job.ty as u8,
            flags: if barrier { JOB_BARRIER } else { 0 },
            index,
            dependency_1: local_dep,
            dependency_2: global_dep,
            ..Default::default()
        };
        pool.write_pod(&job.ptr, 0, &header);

        #[cfg(feature = "log-objects")]
        trace!("Added {:?} job {} (deps {}, {}) at {:#x}", job.ty, index, local_dep, global_dep, job.ptr.gpu);

        self.jobs.push(JobRecord {
            ty: job.ty,
            index,
            ptr: job.ptr,
            dependencies: [local_dep, global_dep],
            header,
        });
        index
    }

    /// Write the `next` pointer of every job so the chain can be walked from its first job.
    pub fn link<A: SlabAllocator>(&mut self, pool: &mut ArenaPool<A>) {
        let next_addresses: Vec<u64> = self.jobs.iter().skip(1).map(JobRecord::address).collect();
        for (job, next) in self.jobs.iter_mut().zip(next_addresses) {
            job.header.next = next;
            pool.write_pod(&job.ptr, 0, &job.header);
        }
    }

    /// Index of the last job added, zero if the chain is empty.
    pub fn job_index(&self) -> u16 {
        self.job_index
    }

    /// The first job of the chain.
    pub fn first_job(&self) -> Option<&JobRecord> {
        self.jobs.first()
    }

    /// GPU address of the first job, zero if the chain is empty.
    pub fn first_job_address(&self) -> u64 {
        self.first_job().map(JobRecord::address).unwrap_or_default()
    }

    /// GPU address of the first tiler job.
    pub fn first_tiler(&self) -> Option<u64> {
        self.first_tiler
    }

    /// Every job, in chain order.
    pub fn jobs(&self) -> &[JobRecord] {
        &self.jobs
    }

    /// The job with the given index.
    pub fn job(&self, index: u16) -> Option<&JobRecord> {
        self.jobs.get((index as usize).checked_sub(1)?)
    }

    /// Number of jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the chain has no jobs.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Number of jobs of one type.
    pub fn count(&self, ty: JobType) -> usize {
        self.jobs.iter().filter(|job| job.ty == ty).count()
    }
}
