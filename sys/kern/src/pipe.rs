// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One-word pipes.
//!
//! A pipe carries a single `u32` at a time from one writer process to one
//! reader process. It is opened by an owner, has each endpoint bound exactly
//! once, and then alternates between holding nothing (`ReadyToWrite`) and
//! holding one value (`ReadyToRead`). Nothing blocks: operations that arrive
//! at the wrong moment fail and can be retried.
//!
//! When checking a transfer, state is considered before authorization, so a
//! stranger writing into a full pipe is told `WrongState`.

use abi::{Pid, PipeError, PipeStatus};

use crate::config::MAX_PIPES;

#[derive(Clone, Debug, Default)]
pub struct Pipe {
    buffer: u32,
    owner: Pid,
    reader: Option<Pid>,
    writer: Option<Pid>,
    status: PipeStatus,
}

impl Pipe {
    pub fn status(&self) -> PipeStatus {
        self.status
    }

    pub fn owner(&self) -> Pid {
        self.owner
    }

    pub fn reader(&self) -> Option<Pid> {
        self.reader
    }

    pub fn writer(&self) -> Option<Pid> {
        self.writer
    }

    fn involves(&self, pid: Pid) -> bool {
        self.owner == pid
            || self.reader == Some(pid)
            || self.writer == Some(pid)
    }

    /// Both endpoints bound: the pipe becomes usable.
    fn maybe_connect(&mut self) {
        if self.reader.is_some() && self.writer.is_some() {
            self.status = PipeStatus::ReadyToWrite;
        }
    }
}

#[derive(Debug)]
pub struct PipeTable {
    pipes: [Pipe; MAX_PIPES],
}

impl Default for PipeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PipeTable {
    pub fn new() -> Self {
        Self {
            pipes: core::array::from_fn(|_| Pipe::default()),
        }
    }

    pub fn pipes(&self) -> &[Pipe] {
        &self.pipes
    }

    fn get(&self, id: i32) -> Result<&Pipe, PipeError> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.pipes.get(i))
            .ok_or(PipeError::InvalidId)
    }

    fn get_mut(&mut self, id: i32) -> Result<&mut Pipe, PipeError> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.pipes.get_mut(i))
            .ok_or(PipeError::InvalidId)
    }

    /// Opens the lowest-numbered closed pipe on behalf of `owner`.
    pub fn open(&mut self, owner: Pid) -> Result<i32, PipeError> {
        let (id, pipe) = self
            .pipes
            .iter_mut()
            .enumerate()
            .find(|(_, p)| p.status == PipeStatus::Closed)
            .ok_or(PipeError::InvalidId)?;
        *pipe = Pipe {
            buffer: 0,
            owner,
            reader: None,
            writer: None,
            status: PipeStatus::Open,
        };
        Ok(id as i32)
    }

    /// Binds the reading end of pipe `id` to `pid`. Anyone may do this, once.
    pub fn assign_reader(
        &mut self,
        id: i32,
        pid: Pid,
    ) -> Result<(), PipeError> {
        let pipe = self.get_mut(id)?;
        if pipe.status == PipeStatus::Closed {
            return Err(PipeError::WrongState);
        }
        if pipe.reader.is_some() {
            return Err(PipeError::AlreadyAssigned);
        }
        pipe.reader = Some(pid);
        pipe.maybe_connect();
        Ok(())
    }

    /// Binds the writing end of pipe `id` to `pid`. Anyone may do this, once.
    pub fn assign_writer(
        &mut self,
        id: i32,
        pid: Pid,
    ) -> Result<(), PipeError> {
        let pipe = self.get_mut(id)?;
        if pipe.status == PipeStatus::Closed {
            return Err(PipeError::WrongState);
        }
        if pipe.writer.is_some() {
            return Err(PipeError::AlreadyAssigned);
        }
        pipe.writer = Some(pid);
        pipe.maybe_connect();
        Ok(())
    }

    /// Deposits `value` in pipe `id`, which must be empty, on behalf of its
    /// writer.
    pub fn write(
        &mut self,
        id: i32,
        caller: Pid,
        value: u32,
    ) -> Result<(), PipeError> {
        let pipe = self.get_mut(id)?;
        if pipe.status != PipeStatus::ReadyToWrite {
            return Err(PipeError::WrongState);
        }
        if pipe.writer != Some(caller) {
            return Err(PipeError::NotAuthorized);
        }
        pipe.buffer = value;
        pipe.status = PipeStatus::ReadyToRead;
        Ok(())
    }

    /// Takes the value out of pipe `id` on behalf of its reader.
    pub fn read(&mut self, id: i32, caller: Pid) -> Result<u32, PipeError> {
        let pipe = self.get_mut(id)?;
        if pipe.status != PipeStatus::ReadyToRead {
            return Err(PipeError::WrongState);
        }
        if pipe.reader != Some(caller) {
            return Err(PipeError::NotAuthorized);
        }
        pipe.status = PipeStatus::ReadyToWrite;
        Ok(core::mem::take(&mut pipe.buffer))
    }

    /// Closes pipe `id`, which only its owner may do. Closing a closed pipe
    /// is harmless.
    pub fn close(&mut self, id: i32, caller: Pid) -> Result<(), PipeError> {
        let pipe = self.get_mut(id)?;
        if pipe.owner != caller {
            return Err(PipeError::NotAuthorized);
        }
        pipe.status = PipeStatus::Closed;
        Ok(())
    }

    /// Whether a `read` of pipe `id` would find a value. Anyone may ask.
    pub fn can_read(&self, id: i32) -> Result<bool, PipeError> {
        Ok(self.get(id)?.status == PipeStatus::ReadyToRead)
    }

    /// Whether a `write` to pipe `id` would find room. Anyone may ask.
    pub fn can_write(&self, id: i32) -> Result<bool, PipeError> {
        Ok(self.get(id)?.status == PipeStatus::ReadyToWrite)
    }

    /// Closes every open pipe that `pid` owns or is an endpoint of. Returns
    /// how many were closed.
    pub fn release(&mut self, pid: Pid) -> usize {
        let mut closed = 0;
        for pipe in self.pipes.iter_mut() {
            if pipe.status != PipeStatus::Closed && pipe.involves(pid) {
                pipe.status = PipeStatus::Closed;
                closed += 1;
            }
        }
        closed
    }

    /// Closes everything.
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}
