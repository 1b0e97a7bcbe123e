mod assembly;
mod mesh;
mod projection;
mod space;
