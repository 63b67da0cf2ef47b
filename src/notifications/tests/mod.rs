//! Test modules for the notification system
