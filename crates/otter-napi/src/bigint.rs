//! BigInt conversion through the helper word bridge
//!
//! The engine keeps BigInt digits private, so magnitudes cross the boundary as
//! little-endian 64-bit words, each split into two 32-bit halves that fit in a
//! script number.

use crate::engine::{self, JSValue, Owned, qjs};
use crate::env::{Core, Env};
use crate::error::{NapiResult, Status};
use crate::scope::Value;

/// Words of a BigInt magnitude with its sign
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BigintWords {
    pub negative: bool,
    pub words: Vec<u64>,
}

impl Env {
    fn check_word_count(&self, count: usize) -> NapiResult<()> {
        if count > self.runtime.config.bigint_max_words {
            return Err(Status::InvalidArg);
        }
        Ok(())
    }

    /// # Safety
    /// `core` must belong to this env.
    pub(crate) unsafe fn bigint_from_words_raw(
        &self,
        core: Core,
        negative: bool,
        words: &[u64],
    ) -> NapiResult<Owned> {
        // SAFETY: every intermediate is owned until the helper call returns
        unsafe {
            let halves = words.iter().flat_map(|word| {
                [
                    Owned::new(core.ctx, engine::new_int64((*word & 0xffff_ffff) as i64)),
                    Owned::new(core.ctx, engine::new_int64((*word >> 32) as i64)),
                ]
            });
            let halves = engine::array_from(core.ctx, halves)?;
            let negative = if negative { qjs::JS_TRUE } else { qjs::JS_FALSE };
            engine::call(
                core.ctx,
                core.helpers.bigint_from_words,
                qjs::JS_UNDEFINED,
                &[negative, halves.raw()],
            )
        }
    }

    /// Sign and words of a BigInt, refused with `InvalidArg` beyond `max_words`
    ///
    /// # Safety
    /// `core` must belong to this env and `value` must be a live BigInt.
    pub(crate) unsafe fn bigint_words_raw(
        &self,
        core: Core,
        value: JSValue,
        max_words: usize,
    ) -> NapiResult<(bool, Vec<u64>)> {
        // SAFETY: forwarded from the caller
        unsafe {
            let pair = engine::call(core.ctx, core.helpers.bigint_to_words, qjs::JS_UNDEFINED, &[value])?;
            let negative = engine::array_get(core.ctx, pair.raw(), 0)?;
            let negative = engine::truthy(qjs::JS_ToBool(core.ctx, negative.raw()));
            let halves = engine::array_get(core.ctx, pair.raw(), 1)?;

            let mut length = 0i64;
            let length_value = engine::checked(
                core.ctx,
                qjs::JS_GetPropertyStr(core.ctx, halves.raw(), c"length".as_ptr()),
            )?;
            if qjs::JS_ToInt64(core.ctx, &mut length, length_value.raw()) < 0 {
                return Err(Status::PendingException);
            }
            let length = length.max(0) as usize;
            if length.div_ceil(2) > max_words {
                return Err(Status::InvalidArg);
            }

            let mut words = Vec::with_capacity(length / 2);
            for index in (0..length as u32).step_by(2) {
                let low = engine::array_get(core.ctx, halves.raw(), index)?;
                let high = engine::array_get(core.ctx, halves.raw(), index + 1)?;
                let low = engine::to_f64(core.ctx, low.raw())? as u64;
                let high = engine::to_f64(core.ctx, high.raw())? as u64;
                words.push((high << 32) | low);
            }
            Ok((negative, words))
        }
    }

    fn bigint(&self, value: Value) -> NapiResult<(Core, JSValue)> {
        let core = self.core()?;
        let raw = self.raw(value)?;
        if self.type_of(value)? != crate::ValueType::Bigint {
            return Err(Status::BigintExpected);
        }
        Ok((core, raw))
    }

    pub fn create_bigint_int64(&self, value: i64) -> NapiResult<Value> {
        let core = self.core()?;
        // SAFETY: ctx is live
        let bigint = unsafe { engine::checked(core.ctx, qjs::JS_NewBigInt64(core.ctx, value))? };
        self.push(bigint)
    }

    pub fn create_bigint_uint64(&self, value: u64) -> NapiResult<Value> {
        let core = self.core()?;
        // SAFETY: ctx is live
        let bigint = unsafe { engine::checked(core.ctx, qjs::JS_NewBigUint64(core.ctx, value))? };
        self.push(bigint)
    }

    /// Build a BigInt from a sign and little-endian 64-bit words
    ///
    /// More words than the configured maximum is rejected with `InvalidArg`.
    pub fn create_bigint_words(&self, negative: bool, words: &[u64]) -> NapiResult<Value> {
        let core = self.preamble()?;
        self.check_word_count(words.len())?;
        // SAFETY: core belongs to self
        let bigint = unsafe { self.bigint_from_words_raw(core, negative, words)? };
        self.push(bigint)
    }

    /// Sign and words of a BigInt; zero has no words
    pub fn get_value_bigint_words(&self, value: Value) -> NapiResult<BigintWords> {
        let (core, raw) = self.bigint(value)?;
        let max_words = self.runtime.config.bigint_max_words;
        // SAFETY: raw is a live BigInt
        let (negative, words) = unsafe { self.bigint_words_raw(core, raw, max_words)? };
        Ok(BigintWords { negative, words })
    }

    /// Value truncated to 64 bits, and whether it fit without loss
    pub fn get_value_bigint_int64(&self, value: Value) -> NapiResult<(i64, bool)> {
        let (core, raw) = self.bigint(value)?;
        // SAFETY: raw is a live BigInt
        let (negative, words) = unsafe { self.bigint_words_raw(core, raw, usize::MAX)? };
        let low = words.first().copied().unwrap_or(0);
        let truncated = if negative {
            (low as i64).wrapping_neg()
        } else {
            low as i64
        };
        let limit = if negative { 1u64 << 63 } else { (1u64 << 63) - 1 };
        Ok((truncated, words.len() <= 1 && low <= limit))
    }

    pub fn get_value_bigint_uint64(&self, value: Value) -> NapiResult<(u64, bool)> {
        let (core, raw) = self.bigint(value)?;
        // SAFETY: raw is a live BigInt
        let (negative, words) = unsafe { self.bigint_words_raw(core, raw, usize::MAX)? };
        let low = words.first().copied().unwrap_or(0);
        let truncated = if negative { low.wrapping_neg() } else { low };
        Ok((truncated, !negative && words.len() <= 1))
    }
}
