//! Conversion between the amplifier's native numeric scales and host values
//!
//! Every function here is pure. Rounding is half-to-even throughout so that
//! repeated host → device → host round-trips at a step midpoint never drift.

use crate::error::{NuvoError, Result};
use crate::types::{BalancePosition, ControlScale, HostValue, NativeValue};

/// Round to the nearest integer, ties to even
pub fn round_half_even(x: f64) -> f64 {
    x.round_ties_even()
}

fn finite(host: HostValue) -> Result<HostValue> {
    if host.is_finite() {
        Ok(host)
    } else {
        Err(NuvoError::InvalidRange(format!("host value {} is not finite", host)))
    }
}

fn volume_floor(scale: &ControlScale) -> Result<f64> {
    scale.validate()?;
    if scale.min == 0 {
        return Err(NuvoError::InvalidRange(
            "volume scale has no attenuation floor".to_string(),
        ));
    }
    Ok(f64::from(scale.min))
}

// ========== Volume (0..1) ==========

/// Native attenuation (0 = loudest, `scale.min` = quietest) to host volume 0..1
pub fn to_host_volume(native: NativeValue, scale: &ControlScale) -> Result<HostValue> {
    let floor = volume_floor(scale)?;
    Ok(1.0 - f64::from(native) / floor)
}

/// Host volume 0..1 to the nearest native attenuation step
pub fn to_device_volume(host: HostValue, scale: &ControlScale) -> Result<NativeValue> {
    let floor = volume_floor(scale)?;
    let native = round_half_even(floor - finite(host)? * floor) as NativeValue;
    Ok(scale.clamp(native))
}

// ========== Tone controls normalized to 0..1 ==========

/// Linear rescale of a native level into 0..1
pub fn to_host_eq(native: NativeValue, scale: &ControlScale) -> Result<HostValue> {
    scale.validate()?;
    Ok(f64::from(native - scale.min) / f64::from(scale.max - scale.min))
}

/// Inverse of [`to_host_eq`]: rescale into device steps, round, then expand by
/// the step granularity
pub fn to_device_eq(host: HostValue, scale: &ControlScale) -> Result<NativeValue> {
    scale.validate()?;
    let step = f64::from(scale.step);
    let steps_min = f64::from(scale.min) / step;
    let steps_max = f64::from(scale.max) / step;
    let steps = round_half_even(finite(host)? * (steps_max - steps_min) + steps_min)
        .clamp(steps_min.min(steps_max), steps_min.max(steps_max));
    Ok(scale.clamp(steps as NativeValue * scale.step))
}

// ========== Signed controls carried as-is ==========

/// Native value of a signed control (bass, treble, gain) as a host value
pub fn to_host_signed(native: NativeValue, scale: &ControlScale) -> Result<HostValue> {
    scale.validate()?;
    Ok(f64::from(native))
}

/// Host value of a signed control snapped to the step grid and clamped
pub fn to_device_signed(host: HostValue, scale: &ControlScale) -> Result<NativeValue> {
    scale.validate()?;
    let lower = scale.lower();
    let max_steps = f64::from(scale.upper() - lower) / f64::from(scale.step);
    let steps = round_half_even((finite(host)? - f64::from(lower)) / f64::from(scale.step))
        .clamp(0.0, max_steps.ceil());
    Ok(scale.clamp(lower + steps as NativeValue * scale.step))
}

// ========== Balance ==========

/// Combine position flag and magnitude into one signed value (negative = left)
pub fn to_host_balance(position: BalancePosition, magnitude: NativeValue) -> HostValue {
    match position {
        BalancePosition::Left => -f64::from(magnitude.abs()),
        BalancePosition::Center => 0.0,
        BalancePosition::Right => f64::from(magnitude.abs()),
    }
}

/// Split a signed balance into position flag and magnitude clamped to the scale
pub fn to_device_balance(
    host: HostValue,
    scale: &ControlScale,
) -> Result<(BalancePosition, NativeValue)> {
    scale.validate()?;
    let host = finite(host)?;
    let magnitude = (round_half_even(host.abs()) as NativeValue).min(scale.upper());
    let position = if magnitude == 0 {
        BalancePosition::Center
    } else if host < 0.0 {
        BalancePosition::Left
    } else {
        BalancePosition::Right
    };
    Ok((position, magnitude))
}

// ========== Volume presets (attenuation in dB) ==========

/// Native attenuation of a volume preset as negative dB (0 = loudest)
pub fn to_host_attenuation(native: NativeValue, scale: &ControlScale) -> Result<HostValue> {
    scale.validate()?;
    Ok(f64::from(-native))
}

/// Negative dB back to native attenuation, clamped to the volume scale
pub fn to_device_attenuation(host: HostValue, scale: &ControlScale) -> Result<NativeValue> {
    scale.validate()?;
    Ok(scale.clamp(round_half_even(-finite(host)?) as NativeValue))
}
